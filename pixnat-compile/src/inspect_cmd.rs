use anyhow::{Context, Result};

use crate::cli::InspectArgs;

pub fn run_inspect(args: InspectArgs) -> Result<()> {
    let policy = natpolicy_core::load(&args.policy)
        .with_context(|| format!("failed to load {}", args.policy.display()))?;

    println!(
        "firewall: {} (platform {}, version {})",
        policy.firewall.name, policy.firewall.platform, policy.firewall.version
    );
    for iface in &policy.firewall.interfaces {
        let zone = iface.netzone.as_deref().unwrap_or("-");
        let addr = iface
            .addr
            .map(|net| net.to_string())
            .unwrap_or_else(|| "dynamic".to_string());
        println!(
            "  {} ({}) level {} addr {} zone {}",
            iface.name, iface.label, iface.security_level, addr, zone
        );
    }
    println!(
        "objects: {}  services: {}  rules: {}",
        policy.objects.len(),
        policy.services.len(),
        policy.rules.len()
    );

    if args.rules {
        for rule in &policy.rules {
            println!(
                "rule {}: osrc={} odst={} osrv={} tsrc={} tdst={} tsrv={}",
                rule.label,
                render(&rule.osrc),
                render(&rule.odst),
                render(&rule.osrv),
                render(&rule.tsrc),
                render(&rule.tdst),
                render(&rule.tsrv),
            );
        }
    }
    Ok(())
}

fn render(element: &natpolicy_core::RuleElement) -> String {
    if element.is_any() {
        "any".to_string()
    } else {
        element.items.join(",")
    }
}
