//! Wallets and the append-only wallet transaction ledger.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(WALLETS_SQL).await?;
        db.execute_unprepared(WALLET_TRANSACTIONS_SQL).await?;
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE wallet_transaction_kind AS ENUM ('deposit', 'withdrawal', 'transfer');
";

const WALLETS_SQL: &str = r"
CREATE TABLE wallets (
    id          UUID PRIMARY KEY,
    user_id     UUID NOT NULL,
    currency    VARCHAR(3) NOT NULL,
    balance     NUMERIC(28, 8) NOT NULL DEFAULT 0,
    version     BIGINT NOT NULL DEFAULT 1,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT uq_wallets_user_currency UNIQUE (user_id, currency),
    CONSTRAINT chk_wallets_currency CHECK (currency ~ '^[A-Z]{3}$'),
    CONSTRAINT chk_wallets_balance_non_negative CHECK (balance >= 0),
    CONSTRAINT chk_wallets_version_positive CHECK (version >= 1)
);
";

const WALLET_TRANSACTIONS_SQL: &str = r"
CREATE TABLE wallet_transactions (
    id              UUID PRIMARY KEY,
    wallet_id       UUID NOT NULL REFERENCES wallets(id),
    user_id         UUID NOT NULL,
    currency        VARCHAR(3) NOT NULL,
    amount          NUMERIC(28, 8) NOT NULL,
    balance_before  NUMERIC(28, 8) NOT NULL,
    balance_after   NUMERIC(28, 8) NOT NULL,
    kind            wallet_transaction_kind NOT NULL,
    related_tx_id   UUID REFERENCES wallet_transactions(id),
    reference       TEXT NOT NULL DEFAULT '',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_wallet_tx_amount_non_zero CHECK (amount <> 0),
    CONSTRAINT chk_wallet_tx_balance_chain CHECK (balance_after = balance_before + amount),
    CONSTRAINT chk_wallet_tx_after_non_negative CHECK (balance_after >= 0)
);

CREATE INDEX idx_wallet_tx_wallet_created
    ON wallet_transactions (wallet_id, created_at DESC, id DESC);
CREATE INDEX idx_wallet_tx_user_created
    ON wallet_transactions (user_id, created_at DESC, id DESC);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: prevent_wallet_transaction_mutation
-- Ledger rows are append-only
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_wallet_transaction_mutation()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'wallet_transactions is append-only: % rejected', TG_OP;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_wallet_transactions_append_only
BEFORE UPDATE OR DELETE ON wallet_transactions
FOR EACH ROW
EXECUTE FUNCTION prevent_wallet_transaction_mutation();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_wallet_transactions_append_only ON wallet_transactions;
DROP FUNCTION IF EXISTS prevent_wallet_transaction_mutation();
DROP TABLE IF EXISTS wallet_transactions;
DROP TABLE IF EXISTS wallets;
DROP TYPE IF EXISTS wallet_transaction_kind;
";
