//! Product command implementation.

use anyhow::{Context, Result};
use colored::Colorize;
use productsearch_core::{NewProduct, Product};
use serde_json::json;
use tracing::info;

use crate::utils::print_json;
use crate::{GlobalArgs, ProductCommand};

/// Execute a product subcommand.
pub async fn execute(globals: &GlobalArgs, command: ProductCommand) -> Result<()> {
    let session = super::connect(globals)?;
    let json = globals.json;

    match command {
        ProductCommand::Create {
            id,
            category,
            display_name,
            description,
            labels,
        } => {
            let mut new = NewProduct::new(&id, category).labels(labels);
            if let Some(name) = display_name {
                new = new.display_name(name);
            }
            if let Some(description) = description {
                new = new.description(description);
            }
            let product = session
                .create_product(new)
                .await
                .with_context(|| format!("Failed to create product `{id}`"))?;
            info!(product_id = %product.id(), "Product created");

            if json {
                print_json(&serde_json::to_value(&product)?)?;
            } else {
                println!("{} {}", "Created product".green().bold(), product.id());
                print_product(&product);
            }
        }

        ProductCommand::Get { id } => {
            let product = session
                .get_product(&id)
                .await
                .with_context(|| format!("Failed to get product `{id}`"))?;
            if json {
                print_json(&serde_json::to_value(&product)?)?;
            } else {
                print_product(&product);
            }
        }

        ProductCommand::List => {
            let products = session
                .list_products()
                .await
                .context("Failed to list products")?;
            if json {
                print_json(&serde_json::to_value(&products)?)?;
            } else if products.is_empty() {
                println!("{}", "No products".dimmed());
            } else {
                for product in &products {
                    println!(
                        "{:<32} {:<18} {}",
                        product.id(),
                        product.category().to_string().dimmed(),
                        product.display_name()
                    );
                }
            }
        }

        ProductCommand::Delete { id } => {
            let mut product = session
                .get_product(&id)
                .await
                .with_context(|| format!("Failed to get product `{id}`"))?;
            product
                .delete()
                .await
                .with_context(|| format!("Failed to delete product `{id}`"))?;
            if json {
                print_json(&json!({ "deleted": product.resource_name() }))?;
            } else {
                println!("{} {}", "Deleted product".green().bold(), id);
            }
        }

        ProductCommand::AddImage {
            id,
            file,
            bounding_polys,
        } => {
            let product = session
                .get_product(&id)
                .await
                .with_context(|| format!("Failed to get product `{id}`"))?;
            let name = product
                .add_reference_image(&file, &bounding_polys)
                .await
                .with_context(|| {
                    format!("Failed to add reference image {} to `{id}`", file.display())
                })?;

            if json {
                print_json(&json!({ "reference_image": name }))?;
            } else {
                println!("{}", "Reference image added".green().bold());
                println!("   {} {}", "Name:".dimmed(), name);
                println!("   {} {}", "Source:".dimmed(), file.display());
            }
        }

        ProductCommand::Images { id } => {
            let product = session
                .get_product(&id)
                .await
                .with_context(|| format!("Failed to get product `{id}`"))?;
            let images = product
                .list_reference_images()
                .await
                .with_context(|| format!("Failed to list reference images of `{id}`"))?;
            if json {
                print_json(&json!(images))?;
            } else if images.is_empty() {
                println!("{}", "No reference images".dimmed());
            } else {
                for image in &images {
                    println!("{image}");
                }
            }
        }

        ProductCommand::ImageUrl { id, image } => {
            let product = session
                .get_product(&id)
                .await
                .with_context(|| format!("Failed to get product `{id}`"))?;
            let url = product
                .reference_image_url(&image)
                .await
                .with_context(|| format!("Failed to resolve reference image `{image}`"))?;
            if json {
                print_json(&json!({ "reference_image": image, "url": url }))?;
            } else {
                println!("{url}");
            }
        }

        ProductCommand::DeleteImage { id, image } => {
            let product = session
                .get_product(&id)
                .await
                .with_context(|| format!("Failed to get product `{id}`"))?;
            product
                .delete_reference_image(&image)
                .await
                .with_context(|| format!("Failed to delete reference image `{image}`"))?;
            if json {
                print_json(&json!({ "deleted": image }))?;
            } else {
                println!("{} {}", "Deleted reference image".green().bold(), image);
            }
        }
    }

    Ok(())
}

fn print_product(product: &Product) {
    println!("   {} {}", "Id:".dimmed(), product.id());
    println!("   {} {}", "Name:".dimmed(), product.display_name());
    println!("   {} {}", "Category:".dimmed(), product.category());
    if let Some(description) = product.description() {
        println!("   {} {}", "Description:".dimmed(), description);
    }
    for (key, value) in product.labels() {
        println!("   {} {}={}", "Label:".dimmed(), key, value);
    }
    println!("   {} {}", "Resource:".dimmed(), product.resource_name());
}
