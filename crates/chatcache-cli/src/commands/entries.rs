use anyhow::{Result, bail};
use chatcache::{CacheKey, RemoteLookup, ResponseCache, ResponseCacheFacade, ResponseSource};
use colored::Colorize;
use serde_json::json;

use super::require_remote;
use crate::cli::{OutputFormat, PutArgs, QueryArgs};
use crate::output::{print_success, print_value};

pub fn key(args: &QueryArgs, format: OutputFormat) -> Result<()> {
    let key = CacheKey::from_query(&args.query, args.context.as_deref());
    print_value(
        &json!({
            "query": args.query,
            "normalized": chatcache::normalize_query(&args.query),
            "context": args.context,
            "key": key.as_str(),
        }),
        format,
    )
}

pub async fn get(cache: ResponseCache, args: &QueryArgs, format: OutputFormat) -> Result<()> {
    require_remote(&cache)?;
    let facade = ResponseCacheFacade::new(cache);
    match facade.lookup(&args.query, args.context.as_deref()).await {
        Some(hit) => print_value(
            &json!({
                "key": CacheKey::from_query(&args.query, args.context.as_deref()).as_str(),
                "value": hit.value,
                "source": hit.source.as_str(),
            }),
            format,
        ),
        None => {
            println!("{} no cached answer for {}", "✗".red(), args.query.cyan());
            Ok(())
        }
    }
}

pub async fn put(cache: ResponseCache, args: &PutArgs) -> Result<()> {
    let remote = require_remote(&cache)?.clone();
    let facade = ResponseCacheFacade::new(cache);
    facade
        .store(
            &args.query.query,
            args.query.context.as_deref(),
            args.value.as_str(),
            ResponseSource::from(args.source.as_str()),
        )
        .await;

    let key = CacheKey::from_query(&args.query.query, args.query.context.as_deref());
    if matches!(remote.get(&key).await, RemoteLookup::Hit(_)) {
        print_success(&format!("stored {}", key.as_str()));
        Ok(())
    } else {
        bail!("the remote tier did not accept the write (see warnings above)")
    }
}

pub async fn invalidate(cache: ResponseCache, args: &QueryArgs) -> Result<()> {
    require_remote(&cache)?;
    let facade = ResponseCacheFacade::new(cache);
    if facade.invalidate(&args.query, args.context.as_deref()).await {
        print_success(&format!("invalidated {}", args.query));
    } else {
        println!("{} nothing cached for {}", "-".dimmed(), args.query.cyan());
    }
    Ok(())
}

pub async fn clear(cache: ResponseCache, confirmed: bool) -> Result<()> {
    let remote = require_remote(&cache)?.clone();
    if !confirmed {
        bail!("refusing to clear the shared cache without --yes");
    }
    if remote.clear().await {
        print_success("cleared the shared cache namespace");
        Ok(())
    } else {
        bail!("the remote tier could not be cleared (see warnings above)")
    }
}
