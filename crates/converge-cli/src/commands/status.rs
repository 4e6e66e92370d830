//! Status command - existence and observed state of one resource

use std::sync::Arc;

use crate::commands::Context;
use crate::display;
use crate::error::{CliError, Result};
use converge_engine::ResourceLifecycle;

/// Run the status command
pub async fn run(
    ctx: &Context,
    kind: &str,
    name: &str,
    namespace: Option<&str>,
    output_json: bool,
) -> Result<()> {
    let definition = ctx.registry.resolve(kind)?.clone();
    let states = definition.readiness.clone();
    let session = ctx.connect(&ctx.namespace(namespace)).await?;
    let handle = session.handle(definition.kind.clone(), name);
    let lifecycle = ResourceLifecycle::new(Arc::new(session), definition);

    if !lifecycle.exists(&handle).await? {
        if output_json {
            let report = serde_json::json!({ "resource": handle.to_string(), "exists": false });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        return Err(CliError::not_found(format!("{} does not exist", handle)));
    }

    let observed = lifecycle.read(&handle).await?;
    if output_json {
        let report = serde_json::json!({
            "resource": handle.to_string(),
            "exists": true,
            "observed": observed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", display::render_observed(&handle, &observed, states.as_ref())?);
    }
    Ok(())
}
