//! Coordinated policy playbooks per jurisdiction

use aq_core::{AlertLevel, CountryCode, PolicyAction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recommended actions per elevated level for one country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryPlaybook {
    pub yellow: Vec<PolicyAction>,
    pub orange: Vec<PolicyAction>,
    pub red: Vec<PolicyAction>,
}

impl CountryPlaybook {
    /// Actions for a level; Green needs none
    pub fn actions(&self, level: AlertLevel) -> &[PolicyAction] {
        match level {
            AlertLevel::Green => &[],
            AlertLevel::Yellow => &self.yellow,
            AlertLevel::Orange => &self.orange,
            AlertLevel::Red => &self.red,
        }
    }

    /// Bangladesh: brick kilns dominate local emissions
    pub fn bangladesh() -> Self {
        use PolicyAction::*;
        Self {
            yellow: vec![StreetWatering, PublicAdvisory],
            orange: vec![ConstructionHalt, StreetWatering],
            red: vec![BrickKilnShutdown, ConstructionHalt, OddEvenVehicles, SchoolClosure],
        }
    }

    /// India: vehicles and industry dominate local emissions
    pub fn india() -> Self {
        use PolicyAction::*;
        Self {
            yellow: vec![StreetWatering, PublicAdvisory],
            orange: vec![IndustrialAudit, StreetWatering],
            red: vec![OddEvenVehicles, SchoolClosure, IndustrialAudit],
        }
    }

    /// Fallback for jurisdictions without a tailored playbook
    pub fn generic() -> Self {
        use PolicyAction::*;
        Self {
            yellow: vec![PublicAdvisory],
            orange: vec![PublicAdvisory, StreetWatering, ConstructionHalt],
            red: vec![PublicAdvisory, ConstructionHalt, IndustrialAudit, SchoolClosure],
        }
    }
}

/// Playbooks for all jurisdictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyPlaybook {
    pub countries: HashMap<CountryCode, CountryPlaybook>,
    pub fallback: CountryPlaybook,
}

impl Default for PolicyPlaybook {
    fn default() -> Self {
        let mut countries = HashMap::new();
        if let Ok(bd) = CountryCode::new("BD") {
            countries.insert(bd, CountryPlaybook::bangladesh());
        }
        if let Ok(india) = CountryCode::new("IN") {
            countries.insert(india, CountryPlaybook::india());
        }
        Self {
            countries,
            fallback: CountryPlaybook::generic(),
        }
    }
}

impl PolicyPlaybook {
    /// Actions recommended to a country at a level
    pub fn actions(&self, country: &CountryCode, level: AlertLevel) -> Vec<PolicyAction> {
        self.countries
            .get(country)
            .unwrap_or(&self.fallback)
            .actions(level)
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_specific_red_actions() {
        let playbook = PolicyPlaybook::default();
        let bd = playbook.actions(&CountryCode::new("BD").unwrap(), AlertLevel::Red);
        assert!(bd.contains(&PolicyAction::BrickKilnShutdown));

        let india = playbook.actions(&CountryCode::new("IN").unwrap(), AlertLevel::Red);
        assert!(india.contains(&PolicyAction::IndustrialAudit));
        assert!(!india.contains(&PolicyAction::BrickKilnShutdown));
    }

    #[test]
    fn test_unknown_country_uses_fallback() {
        let playbook = PolicyPlaybook::default();
        let np = playbook.actions(&CountryCode::new("NP").unwrap(), AlertLevel::Yellow);
        assert_eq!(np, vec![PolicyAction::PublicAdvisory]);
        assert!(playbook
            .actions(&CountryCode::new("NP").unwrap(), AlertLevel::Green)
            .is_empty());
    }
}
