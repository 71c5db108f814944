use std::collections::HashSet;

use crate::model::{Action, Component, Instruction};

/// A validation warning detected while loading component definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// Component the warning belongs to.
    pub source: String,
    /// The specific instruction, option, or reference that triggered it.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.source, self.item, self.message)
    }
}

/// Trait for component validators.
pub trait ConfigValidator {
    /// Validate the components and return any warnings found.
    fn validate(&self, components: &[Component]) -> Vec<ValidationWarning>;

    /// Return a human-readable name for this validator.
    fn name(&self) -> &'static str;
}

/// Checks the ordering graph: dangling edge references and cycles.
#[derive(Debug, Default)]
pub struct GraphValidator;

impl ConfigValidator for GraphValidator {
    fn validate(&self, components: &[Component]) -> Vec<ValidationWarning> {
        let ids: HashSet<&str> = components.iter().map(|c| c.id.as_str()).collect();
        let mut warnings = Vec::new();

        for c in components {
            let edges = [
                ("dependencies", &c.dependencies),
                ("install_after", &c.install_after),
                ("install_before", &c.install_before),
            ];
            for (family, targets) in edges {
                for target in targets {
                    if !ids.contains(target.as_str()) {
                        warnings.push(ValidationWarning::new(
                            &c.id,
                            target,
                            format!("{family} references unknown component"),
                        ));
                    }
                    if target == &c.id {
                        warnings.push(ValidationWarning::new(
                            &c.id,
                            target,
                            format!("{family} references itself"),
                        ));
                    }
                }
            }
        }

        if crate::resolver::has_cycle(components) {
            warnings.push(ValidationWarning::new(
                "<graph>",
                "order",
                "dependency cycle detected; install order will not honour every edge",
            ));
        }

        warnings
    }

    fn name(&self) -> &'static str {
        "graph"
    }
}

/// Checks instruction contents: empty source lists, unknown option ids,
/// and gating lists that reference nothing.
#[derive(Debug, Default)]
pub struct InstructionValidator;

impl InstructionValidator {
    fn check(
        owner: &Component,
        instruction: &Instruction,
        known: &HashSet<&str>,
        warnings: &mut Vec<ValidationWarning>,
    ) {
        let empty_sources = match &instruction.action {
            Action::Extract { sources, .. }
            | Action::Execute { sources, .. }
            | Action::Move { sources, .. }
            | Action::Copy { sources, .. }
            | Action::Rename { sources, .. }
            | Action::Delete { sources, .. } => sources.is_empty(),
            Action::Patcher { source, .. } => source.trim().is_empty(),
            Action::DelDuplicate { .. } | Action::Choose { .. } | Action::CleanList { .. } => false,
        };
        if empty_sources {
            warnings.push(ValidationWarning::new(
                &owner.id,
                &instruction.id,
                format!("{} instruction has no sources", instruction.action.kind()),
            ));
        }

        if let Action::Choose { options } = &instruction.action {
            for option in options {
                if owner.option(option).is_none() {
                    warnings.push(ValidationWarning::new(
                        &owner.id,
                        &instruction.id,
                        format!("choose references unknown option '{option}'"),
                    ));
                }
            }
        }

        for id in instruction
            .dependencies
            .iter()
            .chain(&instruction.restrictions)
        {
            if !known.contains(id.as_str()) {
                warnings.push(ValidationWarning::new(
                    &owner.id,
                    &instruction.id,
                    format!("gating list references unknown id '{id}'"),
                ));
            }
        }
    }
}

impl ConfigValidator for InstructionValidator {
    fn validate(&self, components: &[Component]) -> Vec<ValidationWarning> {
        let known: HashSet<&str> = components
            .iter()
            .flat_map(|c| {
                std::iter::once(c.id.as_str()).chain(c.options.iter().map(|o| o.id.as_str()))
            })
            .collect();
        let mut warnings = Vec::new();

        for c in components {
            let all = c
                .instructions
                .iter()
                .chain(c.options.iter().flat_map(|o| o.instructions.iter()));
            for instruction in all {
                Self::check(c, instruction, &known, &mut warnings);
            }
        }
        warnings
    }

    fn name(&self) -> &'static str {
        "instructions"
    }
}

/// Run every validator over `components`.
#[must_use]
pub fn validate_all(components: &[Component]) -> Vec<ValidationWarning> {
    let validators: [&dyn ConfigValidator; 2] = [&GraphValidator, &InstructionValidator];
    validators
        .iter()
        .flat_map(|v| {
            let warnings = v.validate(components);
            if !warnings.is_empty() {
                tracing::debug!("{} validator found {} issue(s)", v.name(), warnings.len());
            }
            warnings
        })
        .collect()
}
