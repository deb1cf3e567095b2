//! `krca logs`: list stored evidence chunks with filters, sorting and paging.

use anyhow::Result;

use kube_rca_core::retrieval::{list, ListPage, ListRequest};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::sqlite_store::open_store;

pub async fn run_logs(config: &Config, request: &ListRequest, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)?;

    let page = list(&store, embedder.as_deref(), request).await;
    store.close().await;
    let page = page?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_page(&page, request.offset);
    }
    Ok(())
}

fn print_page(page: &ListPage, offset: usize) {
    if page.items.is_empty() {
        println!("No results.");
        return;
    }

    for (i, item) in page.items.iter().enumerate() {
        let meta = |key: &str| {
            item.metadata
                .get(key)
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                })
                .unwrap_or_else(|| "-".to_string())
        };
        match item.distance {
            Some(d) => println!("{}. [{:.3}] {}", offset + i + 1, d, item.id),
            None => println!("{}. {}", offset + i + 1, item.id),
        }
        println!("    namespace: {}  pod: {}", meta("namespace"), meta("pod"));
        println!(
            "    severity: {}  reason: {}",
            meta("severity_hint"),
            meta("reason")
        );
        let excerpt: String = item.document.replace('\n', " ").chars().take(160).collect();
        println!("    excerpt: \"{}\"", excerpt.trim());
        println!();
    }
    println!(
        "Showing {}-{} of {}",
        offset + 1,
        offset + page.items.len(),
        page.count
    );
}
