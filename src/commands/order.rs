//! Order command: print the resolved install order without installing.
use anyhow::Result;

use crate::cli::{GlobalOpts, OrderOpts};
use crate::logging::Logger;
use crate::resolver;

/// Run the order command.
///
/// # Errors
///
/// Returns an error if the component file cannot be loaded.
pub fn run(_global: &GlobalOpts, opts: &OrderOpts, log: &Logger) -> Result<()> {
    let components = super::load_components(&opts.components, log)?;
    let resolution = resolver::resolve(&components);

    log.stage("Install order");
    for (n, id) in resolution.order.iter().enumerate() {
        let component = components.iter().find(|c| &c.id == id);
        let name = component.map_or(id.as_str(), |c| c.name.as_str());
        let marker = if component.is_some_and(|c| c.is_selected) {
            ""
        } else {
            " (not selected)"
        };
        log.info(&format!("{:>3}. {name} [{id}]{marker}", n + 1));
    }

    if resolution.has_cycle {
        log.warn("ordering constraints contain a cycle; components after the cycle are in file order");
    }
    Ok(())
}
