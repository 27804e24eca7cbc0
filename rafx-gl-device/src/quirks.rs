//! Corrections for specific driver/browser combinations, kept as data so they can be audited,
//! replaced or removed without touching the device.

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

/// What a quirk matches against. Conditions that need information that is not available yet
/// (for example the renderer before a context exists) do not match.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxQuirkCondition {
    VendorEquals(String),
    RendererEquals(String),
    /// Case-insensitive substring match
    RendererContains(String),
    UserAgentContains(String),
    /// Major version following `product/` in the user agent, e.g. `Firefox/115.0`
    UserAgentVersionEquals { product: String, major: u32 },
    UserAgentVersionAtLeast { product: String, major: u32 },
    All(Vec<RafxQuirkCondition>),
    Any(Vec<RafxQuirkCondition>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum RafxQuirkEffect {
    DisableMultisampling,
    BoneLimit(u32),
    DisableGpuParticles,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxQuirk {
    pub name: String,
    pub condition: RafxQuirkCondition,
    pub effect: RafxQuirkEffect,
}

/// Information a quirk condition is evaluated against
#[derive(Copy, Clone, Debug, Default)]
pub struct RafxQuirkContext<'a> {
    pub user_agent: Option<&'a str>,
    pub vendor: Option<&'a str>,
    pub renderer: Option<&'a str>,
}

/// Combined result of every matching quirk
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RafxQuirkEffects {
    pub disable_multisampling: bool,
    pub disable_gpu_particles: bool,
    pub bone_limit: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct RafxQuirksTable {
    pub quirks: Vec<RafxQuirk>,
}

fn user_agent_major_version(
    user_agent: &str,
    product: &str,
) -> Option<u32> {
    let pattern = format!("{}/", product);
    let start = user_agent.find(&pattern)? + pattern.len();
    let digits: String = user_agent[start..]
        .chars()
        .take_while(|x| x.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

impl RafxQuirkCondition {
    pub fn matches(
        &self,
        context: &RafxQuirkContext,
    ) -> bool {
        match self {
            RafxQuirkCondition::VendorEquals(vendor) => context.vendor == Some(vendor.as_str()),
            RafxQuirkCondition::RendererEquals(renderer) => {
                context.renderer == Some(renderer.as_str())
            }
            RafxQuirkCondition::RendererContains(needle) => context
                .renderer
                .map(|x| x.to_lowercase().contains(&needle.to_lowercase()))
                .unwrap_or(false),
            RafxQuirkCondition::UserAgentContains(needle) => context
                .user_agent
                .map(|x| x.contains(needle.as_str()))
                .unwrap_or(false),
            RafxQuirkCondition::UserAgentVersionEquals { product, major } => context
                .user_agent
                .and_then(|x| user_agent_major_version(x, product))
                .map(|x| x == *major)
                .unwrap_or(false),
            RafxQuirkCondition::UserAgentVersionAtLeast { product, major } => context
                .user_agent
                .and_then(|x| user_agent_major_version(x, product))
                .map(|x| x >= *major)
                .unwrap_or(false),
            RafxQuirkCondition::All(conditions) => conditions.iter().all(|x| x.matches(context)),
            RafxQuirkCondition::Any(conditions) => conditions.iter().any(|x| x.matches(context)),
        }
    }
}

impl RafxQuirksTable {
    pub fn empty() -> Self {
        RafxQuirksTable::default()
    }

    /// The corrections historically applied to known-bad configurations
    pub fn legacy_defaults() -> Self {
        RafxQuirksTable {
            quirks: vec![
                RafxQuirk {
                    name: "firefox-windows-msaa".to_string(),
                    condition: RafxQuirkCondition::All(vec![
                        RafxQuirkCondition::UserAgentContains("Windows".to_string()),
                        RafxQuirkCondition::Any(vec![
                            RafxQuirkCondition::UserAgentVersionEquals {
                                product: "Firefox".to_string(),
                                major: 115,
                            },
                            RafxQuirkCondition::UserAgentVersionAtLeast {
                                product: "Firefox".to_string(),
                                major: 120,
                            },
                        ]),
                    ]),
                    effect: RafxQuirkEffect::DisableMultisampling,
                },
                RafxQuirk {
                    name: "arm-samsung-gpu-particles".to_string(),
                    condition: RafxQuirkCondition::All(vec![
                        RafxQuirkCondition::VendorEquals("ARM".to_string()),
                        RafxQuirkCondition::UserAgentContains("SM-".to_string()),
                    ]),
                    effect: RafxQuirkEffect::DisableGpuParticles,
                },
                RafxQuirk {
                    name: "mali-g52-gpu-particles".to_string(),
                    condition: RafxQuirkCondition::RendererContains("Mali-G52".to_string()),
                    effect: RafxQuirkEffect::DisableGpuParticles,
                },
                RafxQuirk {
                    name: "mali-450-bone-limit".to_string(),
                    condition: RafxQuirkCondition::RendererEquals("Mali-450 MP".to_string()),
                    effect: RafxQuirkEffect::BoneLimit(34),
                },
            ],
        }
    }

    pub fn with_quirk(
        mut self,
        quirk: RafxQuirk,
    ) -> Self {
        self.quirks.push(quirk);
        self
    }

    pub fn evaluate(
        &self,
        context: &RafxQuirkContext,
    ) -> RafxQuirkEffects {
        let mut effects = RafxQuirkEffects::default();
        for quirk in &self.quirks {
            if !quirk.condition.matches(context) {
                continue;
            }

            log::warn!("Applying device quirk {}: {:?}", quirk.name, quirk.effect);
            match quirk.effect {
                RafxQuirkEffect::DisableMultisampling => effects.disable_multisampling = true,
                RafxQuirkEffect::DisableGpuParticles => effects.disable_gpu_particles = true,
                RafxQuirkEffect::BoneLimit(limit) => {
                    // The most restrictive limit wins
                    effects.bone_limit = Some(effects.bone_limit.map_or(limit, |x| x.min(limit)));
                }
            }
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIREFOX_115_WINDOWS: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:115.0) Gecko/20100101 Firefox/115.0";
    const FIREFOX_118_WINDOWS: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:118.0) Gecko/20100101 Firefox/118.0";
    const FIREFOX_121_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const SAMSUNG: &str =
        "Mozilla/5.0 (Linux; Android 13; SM-S911B) AppleWebKit/537.36 Chrome/120.0 Mobile";

    fn user_agent_only(user_agent: &str) -> RafxQuirkContext {
        RafxQuirkContext {
            user_agent: Some(user_agent),
            ..Default::default()
        }
    }

    #[test]
    fn firefox_windows_multisampling() {
        let table = RafxQuirksTable::legacy_defaults();
        assert!(
            table
                .evaluate(&user_agent_only(FIREFOX_115_WINDOWS))
                .disable_multisampling
        );
        assert!(
            !table
                .evaluate(&user_agent_only(FIREFOX_118_WINDOWS))
                .disable_multisampling
        );
        assert!(
            !table
                .evaluate(&user_agent_only(FIREFOX_121_LINUX))
                .disable_multisampling
        );
    }

    #[test]
    fn vendor_conditions_need_a_context() {
        let table = RafxQuirksTable::legacy_defaults();
        assert!(!table.evaluate(&user_agent_only(SAMSUNG)).disable_gpu_particles);

        let effects = table.evaluate(&RafxQuirkContext {
            user_agent: Some(SAMSUNG),
            vendor: Some("ARM"),
            renderer: Some("Mali-G710"),
        });
        assert!(effects.disable_gpu_particles);
        assert_eq!(effects.bone_limit, None);
    }

    #[test]
    fn renderer_conditions() {
        let table = RafxQuirksTable::legacy_defaults();
        let effects = table.evaluate(&RafxQuirkContext {
            renderer: Some("Mali-450 MP"),
            ..Default::default()
        });
        assert_eq!(effects.bone_limit, Some(34));

        let effects = table.evaluate(&RafxQuirkContext {
            renderer: Some("ANGLE (ARM, mali-g52 mc2)"),
            ..Default::default()
        });
        assert!(effects.disable_gpu_particles);
    }

    #[test]
    fn empty_table_has_no_effects() {
        let effects = RafxQuirksTable::empty().evaluate(&user_agent_only(FIREFOX_115_WINDOWS));
        assert_eq!(effects, RafxQuirkEffects::default());
    }
}
