use super::{Blueprint, DomainError, Module, RelativePath};

/// Centralized domain validation.
///
/// Checks that cannot be expressed in the types themselves, applied when
/// modules and blueprints are loaded rather than when they run.
pub struct DomainValidator;

impl DomainValidator {
    pub fn validate_blueprint(blueprint: &Blueprint) -> Result<(), DomainError> {
        blueprint.validate()?;
        for action in &blueprint.actions {
            // Templated paths are checked again after rendering.
            if let Some(path) = action.kind.target_path() {
                if !path.contains("{{") {
                    RelativePath::try_new(path)?;
                }
            }
        }
        Ok(())
    }

    pub fn validate_module(module: &Module) -> Result<(), DomainError> {
        if module.dependencies.contains(&module.id) {
            return Err(DomainError::InvalidModuleId(format!(
                "{} cannot depend on itself",
                module.id
            )));
        }
        Ok(())
    }
}
