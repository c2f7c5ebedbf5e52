use anyhow::{Context, Result};
use roof_inspect::config::Config;
use roof_inspect::storage::open_storage;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(None).context("loading configuration")?;

    println!(
        "WARNING: This will delete ALL reports, complaints and users from {}",
        config.database.path
    );
    println!("Type 'yes' to continue, anything else cancels:");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    if input.trim() != "yes" {
        println!("Cancelled");
        return Ok(());
    }

    let storage = open_storage(&config.database)?;
    storage.clear_all_data().await?;

    println!("Database cleared. Photo binaries are left in the photo store.");
    Ok(())
}
