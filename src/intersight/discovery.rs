//! Server discovery for domains whose inventory entry lists no servers.

use crate::core::ServerId;
use serde::Deserialize;
use std::collections::HashSet;

pub const PHYSICAL_SUMMARIES_PATH: &str = "/api/v1/compute/PhysicalSummaries";

/// Management modes whose servers report `hw.host` power telemetry.
pub const MONITORED_MANAGEMENT_MODES: [&str; 2] = ["UCSM", "Intersight"];

/// Number of summaries requested per page.
pub const PAGE_SIZE: usize = 100;

/// One page of `compute/PhysicalSummaries`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PhysicalSummaryPage {
    #[serde(rename = "Results", default)]
    pub results: Vec<PhysicalSummary>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PhysicalSummary {
    #[serde(rename = "Serial", default)]
    pub serial: Option<String>,
    #[serde(rename = "ManagementMode", default)]
    pub management_mode: Option<String>,
}

/// Query parameters of the page starting at `skip`.
pub fn page_query(skip: usize) -> Vec<(&'static str, String)> {
    vec![
        ("$select", "Serial,ManagementMode".to_string()),
        ("$top", PAGE_SIZE.to_string()),
        ("$skip", skip.to_string()),
    ]
}

/// Keeps the serials of monitored servers, in listing order, without duplicates.
pub fn select_monitored(summaries: &[PhysicalSummary]) -> Vec<ServerId> {
    let mut seen = HashSet::new();
    summaries
        .iter()
        .filter(|s| {
            s.management_mode
                .as_deref()
                .is_some_and(|mode| MONITORED_MANAGEMENT_MODES.contains(&mode))
        })
        .filter_map(|s| s.serial.as_deref())
        .filter_map(|serial| ServerId::new(serial).ok())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
