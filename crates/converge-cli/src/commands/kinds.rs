//! Kinds command - list registered kinds or show one mutability table

use crate::commands::Context;
use crate::display;
use crate::error::Result;

/// Run the kinds command
pub fn run(ctx: &Context, kind: Option<&str>, output_json: bool) -> Result<()> {
    match kind {
        Some(kind) => {
            let definition = ctx.registry.resolve(kind)?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(definition)?);
            } else {
                print!("{}", display::render_definition(definition));
            }
        }
        None => {
            if output_json {
                let kinds: Vec<&str> = ctx.registry.kinds().collect();
                println!("{}", serde_json::to_string_pretty(&kinds)?);
            } else {
                print!("{}", display::render_kinds(&ctx.registry));
            }
        }
    }
    Ok(())
}
