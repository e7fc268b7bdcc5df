//! `kiln modifiers`: list the registered file modifiers.

use kiln_core::application::modifiers::{ModifierInfo, ModifierRegistry};

use crate::{
    cli::{ListFormat, ModifiersArgs},
    error::CliResult,
    output::OutputManager,
};

pub fn execute(args: ModifiersArgs, output: OutputManager) -> CliResult<()> {
    let modifiers = ModifierRegistry::with_builtins().describe();

    match args.format {
        ListFormat::Json => output.json(&modifiers)?,
        ListFormat::List => {
            for info in &modifiers {
                output.print(info.name)?;
            }
        }
        ListFormat::Table => {
            output.header(&format!("{} modifier(s)", modifiers.len()))?;
            for line in table(&modifiers) {
                output.print(&line)?;
            }
        }
    }
    Ok(())
}

fn table(modifiers: &[ModifierInfo]) -> Vec<String> {
    let name_width = modifiers
        .iter()
        .map(|m| m.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let types_width = modifiers
        .iter()
        .map(|m| m.supported_file_types.join(",").len())
        .max()
        .unwrap_or(0)
        .max("FILES".len());

    let mut lines = vec![format!(
        "{:<name_width$}  {:<types_width$}  DESCRIPTION",
        "NAME", "FILES"
    )];
    for info in modifiers {
        lines.push(format!(
            "{:<name_width$}  {:<types_width$}  {}",
            info.name,
            info.supported_file_types.join(","),
            info.description
        ));
        for param in info.params {
            let required = if param.required { "required" } else { "optional" };
            lines.push(format!(
                "{:<name_width$}    --{} <{}> {required}: {}",
                "", param.name, param.kind, param.description
            ));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_one_row_per_modifier_plus_params() {
        let modifiers = ModifierRegistry::with_builtins().describe();
        let params: usize = modifiers.iter().map(|m| m.params.len()).sum();
        let lines = table(&modifiers);

        assert_eq!(lines.len(), 1 + modifiers.len() + params);
        assert!(lines[0].starts_with("NAME"));
        assert!(lines.iter().any(|l| l.starts_with("json-merge")));
    }
}
