//! Plan command - preview an update offline

use std::path::Path;

use converge_core::{AttributeMap, plan};

use crate::commands::Context;
use crate::display;
use crate::error::Result;

/// Run the plan command
pub fn run(ctx: &Context, kind: &str, observed: &Path, desired: &Path, output_json: bool) -> Result<()> {
    let definition = ctx.registry.resolve(kind)?;
    let observed = AttributeMap::from_file(observed)?;
    let desired = AttributeMap::from_file(desired)?;

    let plan = plan(&definition.schema, &observed, &desired)?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", display::render_plan(definition.kind.as_str(), &plan));
    }
    Ok(())
}
