//! Delete command

use std::sync::Arc;

use console::style;
use converge_engine::{DeleteOptions, ResourceLifecycle};

use crate::commands::{Context, interrupt_token};
use crate::error::Result;

/// Run the delete command
pub async fn run(ctx: &Context, kind: &str, name: &str, namespace: Option<&str>, strict: bool) -> Result<()> {
    let definition = ctx.registry.resolve(kind)?.clone();
    let session = ctx.connect(&ctx.namespace(namespace)).await?;
    let handle = session.handle(definition.kind.clone(), name);
    let lifecycle = ResourceLifecycle::new(Arc::new(session), definition);

    let mut options = DeleteOptions::new().with_cancel(interrupt_token());
    if strict {
        options = options.strict();
    }

    let label = handle.to_string();
    lifecycle.delete(handle, &options).await?;
    println!("{} {} deletion accepted", style("✓").green().bold(), label);
    Ok(())
}
