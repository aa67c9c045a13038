//! Migration runner for the wallet schema.
//!
//! Reads `DATABASE_URL` (a `.env` file is honoured) and accepts the standard
//! sea-orm-migration subcommands:
//!   migrator up      - apply pending migrations
//!   migrator down    - revert the wallet tables
//!   migrator status  - list applied migrations
//!   migrator fresh   - drop everything and re-apply

use purse_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    cli::run_cli(Migrator).await;
}
