use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::{AppContext, Result};
use crate::engine::LinkEnrichmentEngine;

pub async fn enrich_urls(ctx: &AppContext, urls: &[String]) -> Result<()> {
    let results = join_all(urls.iter().map(|url| ctx.service.enrich(url))).await;
    for link in results {
        println!("{}", link);
    }

    ctx.service.shutdown().await;
    Ok(())
}

/// Pipe mode: enrich every line from stdin until EOF or Ctrl-C.
pub async fn rewrite_stdin(ctx: &AppContext) -> Result<()> {
    ctx.service.start_refreshers();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => println!("{}", ctx.service.rewrite_text(&line).await),
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupted, flushing caches...");
                break;
            }
        }
    }

    ctx.service.shutdown().await;
    Ok(())
}

pub fn check_url(ctx: &AppContext, url: &str) -> Result<()> {
    let engines = ctx.service.engines();
    if engines.is_empty() {
        println!("No networks configured");
        return Ok(());
    }

    let route = ctx.service.route(url).map(LinkEnrichmentEngine::network);
    for engine in engines {
        let canonical = engine.canonicalize(url);
        let marker = if route == Some(engine.network()) { "*" } else { " " };
        if canonical.eligible {
            println!("{} {}: eligible, key {}", marker, engine.network(), canonical.key);
        } else {
            println!("{} {}: not eligible", marker, engine.network());
        }
    }

    if route.is_none() {
        println!("URL would pass through unchanged");
    }
    Ok(())
}

pub fn list_cache(ctx: &AppContext, network: Option<&str>) -> Result<()> {
    let engines = selected_engines(ctx, network)?;

    for engine in engines {
        let entries = engine.cache().entries();
        println!(
            "{} ({} of {} links)",
            engine.network(),
            entries.len(),
            engine.cache().capacity()
        );
        for entry in entries {
            println!(
                "  {} {}\n    {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.canonical_key,
                entry.generated_link
            );
        }
    }

    Ok(())
}

pub fn session_status(ctx: &AppContext) -> Result<()> {
    let engines = ctx.service.engines();
    if engines.is_empty() {
        println!("No networks configured");
        return Ok(());
    }

    for engine in engines {
        let status = engine.session().status();
        print!("{}: {}", engine.network(), status.state);
        if let (Some(acquired_at), Some(age)) = (status.acquired_at, status.age) {
            print!(
                " (acquired {}, {}s ago",
                acquired_at.format("%Y-%m-%d %H:%M:%S"),
                age.num_seconds()
            );
            if let Some(source) = status.source {
                print!(", {}", source);
            }
            print!(")");
        }
        println!();
        if let Some(error) = status.last_error {
            println!("  last error: {}", error);
        }
    }

    Ok(())
}

pub async fn refresh_sessions(ctx: &AppContext, network: Option<&str>) -> Result<()> {
    let engines = selected_engines(ctx, network)?;

    let mut failures = 0;
    for engine in engines {
        match engine.session().refresh().await {
            Ok(credential) => println!(
                "{}: refreshed at {}",
                engine.network(),
                credential.acquired_at.format("%Y-%m-%d %H:%M:%S")
            ),
            Err(e) => {
                failures += 1;
                eprintln!("{}: refresh failed: {}", engine.network(), e);
            }
        }
    }

    if failures > 0 {
        println!("{} network(s) could not be refreshed", failures);
    }
    Ok(())
}

fn selected_engines<'a>(
    ctx: &'a AppContext,
    network: Option<&str>,
) -> Result<Vec<&'a LinkEnrichmentEngine>> {
    match network {
        Some(name) => Ok(vec![ctx.engine(name)?]),
        None => Ok(ctx.service.engines().iter().collect()),
    }
}
