//! Continual policy service
//!
//! # Usage
//!
//! ```bash
//! continual-policy serve --bind 0.0.0.0:8088
//! continual-policy --format json prompt "compare axum vs actix" --context "small team"
//! continual-policy policy list
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 3: Invalid input, arguments or configuration
//! - 4: Policy version or file not found
//! - 10: Internal error

use clap::Parser;
use continual_policy_api::{run_cli, PolicyCli};

#[tokio::main]
async fn main() {
    let cli = PolicyCli::parse();
    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}
