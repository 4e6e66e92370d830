//! Display formatting for CLI output
//!
//! Renderers return strings so they can be snapshot-tested; commands print
//! them.

use console::style;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write;
use std::time::Duration;

use converge_core::{
    AttributeChange, AttributePath, FieldSchema, Mutability, ObservedState, PatchMapping, Plan,
    ResourceHandle,
};
use converge_engine::{DefinitionRegistry, ResourceDefinition, StateClass, StateSets};

/// Spinner shown on stderr while waiting for convergence
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Raw state colored by its class
pub fn styled_state(state: &str, states: Option<&StateSets>) -> String {
    match states.map(|s| s.classify(state)) {
        Some(StateClass::Ready) => style(state).green().to_string(),
        Some(StateClass::Failed) => style(state).red().to_string(),
        Some(StateClass::Pending) => style(state).yellow().to_string(),
        None => style(state).dim().to_string(),
    }
}

fn change_line(change: &AttributeChange) -> String {
    let path = change.path.to_string();
    if change.old_value.is_null() {
        format!("  {} {} = {}", style("+").green(), path, change.new_value)
    } else if change.new_value.is_null() {
        format!("  {} {}", style("-").red(), path)
    } else {
        format!(
            "  {} {}: {} -> {}",
            style("~").yellow(),
            path,
            change.old_value,
            change.new_value
        )
    }
}

/// Human-readable plan
pub fn render_plan(kind: &str, plan: &Plan) -> String {
    let mut out = String::new();
    match plan {
        Plan::NoChange => {
            let _ = writeln!(out, "{} No changes for {}", style("✓").green(), kind);
        }
        Plan::Update {
            changes,
            operations,
            reprovisions,
        } => {
            let _ = writeln!(
                out,
                "{} {} will be updated in place{}",
                style("~").yellow().bold(),
                kind,
                if *reprovisions { " (re-provisions)" } else { "" }
            );
            for change in changes {
                let _ = writeln!(out, "{}", change_line(change));
            }
            let _ = writeln!(out, "\n{}", style("Operations:").bold());
            for op in operations {
                let _ = writeln!(out, "  {}", op);
            }
        }
        Plan::Replace { paths } => {
            let _ = writeln!(
                out,
                "{} {} must be replaced",
                style("!").red().bold(),
                kind
            );
            for path in paths {
                let _ = writeln!(out, "  {} {} (immutable)", style("!").red(), path);
            }
        }
    }
    out
}

/// Status block for one resource
pub fn render_observed(
    handle: &ResourceHandle,
    observed: &ObservedState,
    states: Option<&StateSets>,
) -> Result<String, serde_yaml::Error> {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("RESOURCE").bold().underlined());
    let _ = writeln!(out, "  Kind:      {}", style(&handle.kind).cyan());
    let _ = writeln!(out, "  Id:        {}", style(&handle.id).cyan());
    let _ = writeln!(out, "  State:     {}", styled_state(&observed.state, states));
    let _ = writeln!(
        out,
        "  Observed:  {}",
        observed.observed_at.format("%Y-%m-%d %H:%M:%S")
    );

    if !observed.attributes.is_empty() {
        let _ = writeln!(out, "\n{}", style("ATTRIBUTES").bold().underlined());
        let yaml = serde_yaml::to_string(&observed.attributes)?;
        for line in yaml.lines() {
            let _ = writeln!(out, "  {}", line);
        }
    }
    Ok(out)
}

/// One line per registered kind
pub fn render_kinds(registry: &DefinitionRegistry) -> String {
    let width = registry.kinds().map(str::len).max().unwrap_or(0);
    let mut out = String::new();
    for definition in registry.iter() {
        let _ = writeln!(
            out,
            "{:<width$}  {}",
            style(definition.kind.as_str()).cyan(),
            style(&definition.description).dim(),
            width = width
        );
    }
    out
}

fn field_flags(field: &FieldSchema) -> Vec<String> {
    let mut flags = Vec::new();
    if field.mutability == Mutability::ImmutableForcesReplace {
        flags.push("immutable".to_string());
    }
    if field.computed {
        flags.push("computed".to_string());
    }
    if field.reprovisions {
        flags.push("reprovisions".to_string());
    }
    if field.omit_if_empty {
        flags.push("omit-if-empty".to_string());
    }
    if field.defaulted {
        flags.push("defaulted".to_string());
    }
    if field.atomic {
        flags.push("atomic".to_string());
    }
    match &field.patch {
        PatchMapping::SamePath => {}
        PatchMapping::At(path) => flags.push(format!("patched at {}", path)),
        PatchMapping::Unsupported => flags.push("unpatchable".to_string()),
    }
    flags
}

fn collect_rows<'a>(
    fields: &'a IndexMap<String, FieldSchema>,
    parent: &AttributePath,
    rows: &mut Vec<(String, &'a FieldSchema)>,
) {
    for (name, field) in fields {
        let path = parent.child(name);
        rows.push((path.to_string(), field));
        collect_rows(&field.fields, &path, rows);
    }
}

/// Mutability table of one kind
pub fn render_definition(definition: &ResourceDefinition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style(definition.kind.as_str()).cyan().bold());
    if !definition.description.is_empty() {
        let _ = writeln!(out, "  {}", definition.description);
    }
    if let Some(key) = &definition.natural_key {
        let _ = writeln!(out, "  Natural key: {}", key);
    }
    if let Some(states) = &definition.readiness {
        let _ = writeln!(out, "  Ready when:  {}", states.ready.join(", "));
    }

    let mut rows = Vec::new();
    collect_rows(&definition.schema.fields, &AttributePath::root(), &mut rows);
    let width = rows.iter().map(|(path, _)| path.len()).max().unwrap_or(0);

    let _ = writeln!(out, "\n{}", style("FIELDS").bold().underlined());
    for (path, field) in rows {
        let kind = serde_json::to_value(field.field_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let flags = field_flags(field);
        let line = format!("  {:<width$}  {:<8} {}", path, kind, flags.join(", "), width = width);
        let _ = writeln!(out, "{}", line.trim_end());
    }

    if !definition.dependents.is_empty() {
        let _ = writeln!(out, "\n{}", style("DEPENDENTS").bold().underlined());
        for dependent in &definition.dependents {
            let _ = writeln!(
                out,
                "  {} ({}, {:?})",
                dependent.name, dependent.kind, dependent.provisioning
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{AttributeMap, plan};
    use converge_engine::kinds::server;

    fn plain() {
        console::set_colors_enabled(false);
    }

    #[test]
    fn test_render_update_plan() {
        plain();
        let old = AttributeMap::from_yaml("hostname: web-1\ncores: 2\nnotes: old\n").unwrap();
        let new = AttributeMap::from_yaml("hostname: web-1\ncores: 8\ntags: [prod]\n").unwrap();
        let plan = plan(&server::schema(), &old, &new).unwrap();

        insta::assert_snapshot!(render_plan("server", &plan), @r###"
        ~ server will be updated in place (re-provisions)
          ~ /cores: 2 -> 8
          + /tags = ["prod"]
          - /notes

        Operations:
          replace /cores = 8
          add /tags = ["prod"]
          remove /notes
        "###);
    }

    #[test]
    fn test_render_replace_plan() {
        plain();
        let old = AttributeMap::from_yaml("hostname: web-1\ndatacenter: ams01\n").unwrap();
        let new = AttributeMap::from_yaml("hostname: web-1\ndatacenter: dal10\n").unwrap();
        let plan = plan(&server::schema(), &old, &new).unwrap();

        insta::assert_snapshot!(render_plan("server", &plan), @r###"
        ! server must be replaced
          ! /datacenter (immutable)
        "###);
    }

    #[test]
    fn test_render_definition_flags() {
        plain();
        let rendered = render_definition(&server::definition());
        assert!(rendered.contains("Natural key: /hostname"));
        assert!(rendered.contains("/datacenter"));
        assert!(
            rendered
                .lines()
                .any(|l| l.contains("/user_metadata") && l.ends_with("unpatchable"))
        );
    }
}
