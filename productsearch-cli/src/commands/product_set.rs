//! Product set command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use productsearch_core::{ProductSearch, ProductSet};
use serde_json::json;
use tracing::info;

use crate::utils::{format_timestamp, print_json};
use crate::{GlobalArgs, SetCommand};

/// Execute a set subcommand.
pub async fn execute(globals: &GlobalArgs, command: SetCommand) -> Result<()> {
    let session = super::connect(globals)?;
    let json = globals.json;

    match command {
        SetCommand::Create { id, display_name } => {
            let set = session
                .create_product_set(&id, display_name.as_deref())
                .await
                .with_context(|| format!("Failed to create product set `{id}`"))?;
            info!(product_set_id = %set.id(), "Product set created");
            if json {
                print_json(&serde_json::to_value(&set)?)?;
            } else {
                println!("{} {}", "Created product set".green().bold(), set.id());
                print_set(&set);
            }
        }

        SetCommand::Get { id } => {
            let set = get_set(&session, &id).await?;
            if json {
                print_json(&serde_json::to_value(&set)?)?;
            } else {
                print_set(&set);
            }
        }

        SetCommand::List => {
            let sets = session
                .list_product_sets()
                .await
                .context("Failed to list product sets")?;
            if json {
                print_json(&serde_json::to_value(&sets)?)?;
            } else if sets.is_empty() {
                println!("{}", "No product sets".dimmed());
            } else {
                for set in &sets {
                    println!(
                        "{:<32} {:<24} {}",
                        set.id(),
                        format_timestamp(set.cached_index_time()).dimmed(),
                        set.display_name()
                    );
                }
            }
        }

        SetCommand::Delete { id } => {
            let mut set = get_set(&session, &id).await?;
            set.delete()
                .await
                .with_context(|| format!("Failed to delete product set `{id}`"))?;
            if json {
                print_json(&json!({ "deleted": set.resource_name() }))?;
            } else {
                println!("{} {}", "Deleted product set".green().bold(), id);
            }
        }

        SetCommand::Add { set, product } => {
            let product_set = get_set(&session, &set).await?;
            let member = session
                .get_product(&product)
                .await
                .with_context(|| format!("Failed to get product `{product}`"))?;
            product_set
                .add_product(&member)
                .await
                .with_context(|| format!("Failed to add `{product}` to `{set}`"))?;
            if json {
                print_json(&json!({ "product_set": set, "added": product }))?;
            } else {
                println!("{} {} -> {}", "Added".green().bold(), product, set);
                println!(
                    "   {}",
                    "Searchable after the next index run of the set".dimmed()
                );
            }
        }

        SetCommand::Remove { set, product } => {
            let product_set = get_set(&session, &set).await?;
            let member = session
                .get_product(&product)
                .await
                .with_context(|| format!("Failed to get product `{product}`"))?;
            product_set
                .remove_product(&member)
                .await
                .with_context(|| format!("Failed to remove `{product}` from `{set}`"))?;
            if json {
                print_json(&json!({ "product_set": set, "removed": product }))?;
            } else {
                println!("{} {} from {}", "Removed".green().bold(), product, set);
            }
        }

        SetCommand::Products { set } => {
            let product_set = get_set(&session, &set).await?;
            let products = product_set
                .list_products()
                .await
                .with_context(|| format!("Failed to list products in `{set}`"))?;
            if json {
                print_json(&serde_json::to_value(&products)?)?;
            } else if products.is_empty() {
                println!("{}", "No products".dimmed());
            } else {
                for product in &products {
                    println!("{:<32} {}", product.id(), product.display_name());
                }
            }
        }

        SetCommand::IndexTime { set } => {
            let mut product_set = get_set(&session, &set).await?;
            let index_time = product_set
                .index_time()
                .await
                .with_context(|| format!("Failed to get index time of `{set}`"))?;
            if json {
                print_json(&json!({ "product_set": set, "index_time": index_time }))?;
            } else {
                println!("{}", format_timestamp(index_time));
            }
        }
    }

    Ok(())
}

async fn get_set(session: &ProductSearch, id: &str) -> Result<ProductSet> {
    session
        .get_product_set(id)
        .await
        .with_context(|| format!("Failed to get product set `{id}`"))
}

fn print_set(set: &ProductSet) {
    println!("   {} {}", "Id:".dimmed(), set.id());
    println!("   {} {}", "Name:".dimmed(), set.display_name());
    println!(
        "   {} {}",
        "Indexed:".dimmed(),
        format_timestamp(set.cached_index_time())
    );
    println!("   {} {}", "Resource:".dimmed(), set.resource_name());
}
