//! Rewrites scheduler failures into actionable guidance

use crate::crd::Engine;

/// Known scheduler failures, checked in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shortfall {
    AntiAffinity,
    Memory,
    Cpu,
}

const RULES: &[(&str, Shortfall)] = &[
    (
        "node(s) didn't match pod affinity/anti-affinity",
        Shortfall::AntiAffinity,
    ),
    ("Insufficient memory.", Shortfall::Memory),
    ("Insufficient cpu.", Shortfall::Cpu),
];

impl Shortfall {
    fn flag_suffix(self) -> &'static str {
        match self {
            Shortfall::AntiAffinity => "anti-affinity-key",
            Shortfall::Memory => "request-mem",
            Shortfall::Cpu => "request-cpu",
        }
    }

    fn render(self, pods: &str, flag: &str) -> String {
        match self {
            Shortfall::AntiAffinity => format!(
                "Cluster node(s) didn't satisfy {} pods [anti-]affinity rules. Try to change {} parameter or add more nodes/change topology of your cluster.",
                pods, flag
            ),
            Shortfall::Memory => format!(
                "Available memory not enough to satisfy {} request. Try to change {} parameter or add more memory to your cluster.",
                pods, flag
            ),
            Shortfall::Cpu => format!(
                "Available CPU not enough to satisfy {} request. Try to change {} parameter or add more CPU to your cluster.",
                pods, flag
            ),
        }
    }
}

/// Pod group named by the text before the first `:`, and its flag prefix
fn attribute(engine: Engine, message: &str) -> (&'static str, &'static str) {
    match engine {
        Engine::Psmdb => ("replica set", "--"),
        Engine::Pxc => {
            let prefix = message.split_once(':').map(|(p, _)| p.trim());
            match prefix {
                Some("ProxySQL") => ("ProxySQL", "--proxy-"),
                // PXC and unattributed messages
                _ => ("PXC", "--pxc-"),
            }
        }
    }
}

/// Rewrite one status message, passing unknown ones through unchanged
pub fn rewrite(engine: Engine, message: &str) -> String {
    let Some((_, shortfall)) = RULES.iter().find(|(pattern, _)| message.contains(pattern)) else {
        return message.to_string();
    };
    let (pods, flag_prefix) = attribute(engine, message);
    let flag = format!("{}{}", flag_prefix, shortfall.flag_suffix());
    shortfall.render(pods, &flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anti_affinity_names_component_flag() {
        let pxc = rewrite(
            Engine::Pxc,
            "PXC: 0/3 nodes are available: node(s) didn't match pod affinity/anti-affinity.",
        );
        assert!(pxc.contains("--pxc-anti-affinity-key"));
        assert!(pxc.contains("PXC pods"));

        let proxy = rewrite(
            Engine::Pxc,
            "ProxySQL: 0/3 nodes are available: node(s) didn't match pod affinity/anti-affinity.",
        );
        assert!(proxy.contains("--proxy-anti-affinity-key"));
    }

    #[test]
    fn resource_shortfalls_name_request_flags() {
        let mem = rewrite(Engine::Pxc, "ProxySQL: 0/1 nodes are available: 1 Insufficient memory.");
        assert!(mem.contains("--proxy-request-mem"));

        let cpu = rewrite(Engine::Psmdb, "0/1 nodes are available: 1 Insufficient cpu.");
        assert!(cpu.contains("--request-cpu"));
        assert!(cpu.contains("replica set"));
    }

    #[test]
    fn unattributed_pxc_messages_fall_back_to_pxc() {
        let text = rewrite(Engine::Pxc, "0/1 nodes are available: 1 Insufficient cpu.");
        assert!(text.contains("--pxc-request-cpu"));
    }

    #[test]
    fn unknown_messages_pass_through() {
        let raw = "PXC: back-off restarting failed container";
        assert_eq!(rewrite(Engine::Pxc, raw), raw);
    }
}
