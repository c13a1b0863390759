//! Primary entrypoint for the `stacklint` CLI binary.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    stacklint_cli::run().await
}
