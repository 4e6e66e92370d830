//! Apply command - create or update a resource and wait for it

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use converge_core::{AttributeMap, AttributePath, Override};
use converge_engine::{
    Applied, CreateOptions, MockResourceClient, ResourceClient, ResourceLifecycle, Timing,
};

use crate::commands::{Context, interrupt_token};
use crate::display;
use crate::error::{CliError, Result};

/// Timing used against the in-memory façade
const SIMULATED_TIMING: Timing = Timing {
    poll_interval: Duration::from_millis(100),
    min_poll_interval: Duration::from_millis(50),
    timeout: Duration::from_secs(10),
    initial_delay: Duration::ZERO,
};

pub struct ApplyArgs<'a> {
    pub file: &'a Path,
    pub namespace: Option<&'a str>,
    pub set: &'a [String],
    pub no_wait: bool,
    pub timeout: Option<u64>,
    pub simulate: bool,
}

/// Run the apply command
pub async fn run(ctx: &Context, args: ApplyArgs<'_>) -> Result<()> {
    let mut desired = AttributeMap::from_file(args.file)?;
    let overrides = args
        .set
        .iter()
        .map(|arg| arg.parse::<Override>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let kind = desired
        .lookup("kind")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CliError::usage_with_help(
                format!("{} has no 'kind'", args.file.display()),
                "add a top-level `kind:` naming a registered kind",
            )
        })?;
    let definition = ctx.registry.resolve(&kind)?.clone();
    desired.apply_overrides(&definition.schema, &overrides)?;

    // Only Kubernetes kinds carry `kind` in their document
    if !definition.schema.fields.contains_key("kind") {
        desired.remove(&AttributePath::new(["kind"]));
    }

    let mut options = CreateOptions::new()
        .with_duplicate_guard(ctx.config.guard_duplicates)
        .with_cancel(interrupt_token());
    if args.no_wait {
        options = options.no_wait();
    }
    if let Some(secs) = args.timeout {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let applied = if args.simulate {
        tracing::info!(kind = %definition.kind, "Applying against the in-memory façade");
        let client = Arc::new(MockResourceClient::simulating(ctx.registry.iter()));
        let lifecycle = ResourceLifecycle::new(client, definition).with_timing(SIMULATED_TIMING);
        converge(&lifecycle, &desired, &options).await?
    } else {
        let namespace = target_namespace(ctx, args.namespace, &desired);
        desired.set(
            &AttributePath::new(["metadata", "namespace"]),
            namespace.clone().into(),
        )?;
        let timing = ctx.config.timing_for(definition.kind.as_str());
        let session = ctx.connect(&namespace).await?;
        let lifecycle = ResourceLifecycle::new(Arc::new(session), definition).with_timing(timing);
        converge(&lifecycle, &desired, &options).await?
    };

    println!(
        "{} {} {} ({})",
        style("✓").green().bold(),
        applied.handle(),
        applied.verb(),
        display::styled_state(&applied.observed().state, None)
    );
    Ok(())
}

/// Namespace from the flag, then the manifest, then the config
fn target_namespace(ctx: &Context, flag: Option<&str>, desired: &AttributeMap) -> String {
    flag.or_else(|| desired.lookup("metadata.namespace").and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| ctx.config.namespace.clone())
}

async fn converge<C: ResourceClient + ?Sized>(
    lifecycle: &ResourceLifecycle<C>,
    desired: &AttributeMap,
    options: &CreateOptions,
) -> Result<Applied> {
    let spinner = display::spinner(format!("Applying {}", lifecycle.kind()));
    let result = lifecycle.apply(desired, options).await;
    spinner.finish_and_clear();
    Ok(result?)
}
