//! Operation request schema generator
//!
//! Prints the JSON schema of the request file `dbaas-engine` reads.
//!
//! Usage: cargo run --bin schemagen > deploy/request.schema.json

use dbaas_engine::adapters::OperationRequest;

fn main() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(OperationRequest);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
