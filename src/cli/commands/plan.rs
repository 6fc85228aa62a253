//! Execution plan display.

use console::style;

use community_migrate::importers::default_registry;
use community_migrate::Orchestrator;

pub fn cmd_plan(entities: &[String]) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(default_registry()?);
    let plan = orchestrator.resolve(entities)?;

    println!("{}", style("Execution plan").bold());
    println!("{}", "-".repeat(40));

    for (i, name) in plan.iter().enumerate() {
        println!("{:>3}. {}", i + 1, style(name).cyan());
        let Some(importer) = orchestrator.registry().get(name) else {
            continue;
        };
        for dep in importer.dependencies() {
            println!(
                "       {} {} ({}: {})",
                style("↳").dim(),
                dep.entity,
                dep.kind.as_str(),
                dep.reason
            );
        }
    }

    Ok(())
}
