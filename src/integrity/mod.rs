//! Document integrity
//!
//! Loading a document is a two step pipeline: upgrade it along its version
//! chain, then validate every field. Version problems are fatal; field
//! problems are collected into a report so they can all be shown at once.

pub mod migrate;
pub mod validate;

use serde_json::Value;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::report::{IntegrityReport, Report};
use crate::site::Sites;

pub use migrate::{Chain, DEFAULT_DNS, SETTINGS_CHAIN, SITE_CHAIN};
pub use validate::{validate_settings, validate_site};

/// Current sites document version
pub const SITE_LATEST_VERSION: &str = "0.1.3";

/// Current settings document version
pub const SETTINGS_LATEST_VERSION: &str = "0.1.1";

/// Upgrade and validate every site of a sites document
pub fn check_sites(document: Value) -> Result<(Sites, IntegrityReport)> {
    let Value::Object(entries) = document else {
        return Err(Error::Config("sites document must be a JSON object".into()));
    };

    let mut sites = Sites::new();
    let mut report = IntegrityReport::new();
    for (name, value) in entries {
        let mut migration = Report::new();
        let upgraded = SITE_CHAIN.upgrade(&format!("Site {}", name), value, &mut migration)?;
        let (site, site_report) = validate_site(&name, &upgraded, migration);
        if let Some(site) = site {
            sites.insert(name, site);
        }
        report.insert(site_report);
    }
    Ok((sites, report))
}

/// Parse, upgrade and validate sites JSON; empty text is an empty document
pub fn load_sites(text: &str) -> Result<(Sites, IntegrityReport)> {
    if text.trim().is_empty() {
        return Ok((Sites::new(), IntegrityReport::new()));
    }
    check_sites(serde_json::from_str(text)?)
}

/// Parse, upgrade and validate settings JSON; empty text yields defaults
pub fn load_settings(text: &str) -> Result<(Settings, Report)> {
    if text.trim().is_empty() {
        return Ok((Settings::default(), Report::new()));
    }
    let mut report = Report::new();
    let upgraded = SETTINGS_CHAIN.upgrade("Settings", serde_json::from_str(text)?, &mut report)?;
    let (settings, checks) = validate_settings(&upgraded);
    report.extend(checks);
    Ok((settings, report))
}
