//! BLE scanning functionality.
//!
//! Decides which advertisement is the mask and runs the
//! scan-until-match-or-timeout loop.
//!
//! Matching criteria, strongest first:
//! 1. exact advertised name
//! 2. advertised service identifier (full UUID or its 16-bit short code)
//! 3. name containing one of the configured hints, case-insensitive
//!
//! Strong matches (1 and 2) end the scan at once. A hint-only match waits a
//! short grace window so a strong match seen at about the same time wins.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::ble::transport::{Advertisement, Transport};
use crate::ble::uuids::{SERVICE_SHORT_CODE, SERVICE_UUID};
use crate::config::MaskConfig;
use crate::error::{Error, Result};
use crate::utils::normalize_service_id;

/// Why an advertisement was accepted. Ordered strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchReason {
    /// The advertised name equals the configured device name.
    ExactName,
    /// The mask service identifier is advertised.
    ServiceUuid,
    /// The name contains one of the configured hints.
    NameHint,
}

impl MatchReason {
    /// Whether this match ends the scan immediately.
    pub fn is_strong(&self) -> bool {
        !matches!(self, Self::NameHint)
    }
}

impl std::fmt::Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactName => write!(f, "name"),
            Self::ServiceUuid => write!(f, "service UUID"),
            Self::NameHint => write!(f, "name hint"),
        }
    }
}

/// Predicate deciding whether an advertisement is the mask.
#[derive(Debug, Clone)]
pub struct DeviceMatcher {
    /// Exact name to match.
    device_name: String,
    /// Uppercased name fragments.
    name_hints: Vec<String>,
    /// Normalized full service UUID.
    service_id: String,
    /// Normalized 16-bit short code.
    short_code: String,
}

impl DeviceMatcher {
    /// Build a matcher from the controller configuration.
    pub fn new(config: &MaskConfig) -> Self {
        Self {
            device_name: config.device_name.clone(),
            name_hints: config.name_hints.iter().map(|h| h.to_uppercase()).collect(),
            service_id: normalize_service_id(&SERVICE_UUID.to_string()),
            short_code: SERVICE_SHORT_CODE.to_string(),
        }
    }

    /// Evaluate an advertisement, returning the strongest reason it matches.
    pub fn evaluate(&self, adv: &Advertisement) -> Option<MatchReason> {
        if adv.name.as_deref() == Some(self.device_name.as_str()) {
            return Some(MatchReason::ExactName);
        }

        if adv.services.iter().any(|s| self.matches_service(s)) {
            return Some(MatchReason::ServiceUuid);
        }

        let name = adv.name.as_deref()?.to_uppercase();
        if self.name_hints.iter().any(|hint| name.contains(hint.as_str())) {
            return Some(MatchReason::NameHint);
        }

        None
    }

    /// Compare an advertised service identifier against the mask service.
    fn matches_service(&self, service: &str) -> bool {
        let normalized = normalize_service_id(service);
        if !normalized.is_ascii() {
            return false;
        }

        match normalized.len() {
            4 => normalized == self.short_code,
            32 => {
                normalized == self.service_id
                    || normalized.get(4..8) == Some(self.short_code.as_str())
            }
            _ => false,
        }
    }
}

/// Scan until the mask is found or `config.scan_timeout` elapses.
///
/// Scanning is always stopped before returning.
pub async fn scan_for_device<T: Transport + ?Sized>(
    transport: &T,
    matcher: &DeviceMatcher,
    config: &MaskConfig,
) -> Result<(Advertisement, MatchReason)> {
    info!("Starting BLE scan for {}", config.device_name);

    let mut rx = transport.start_scan().await?;
    let result = select_device(&mut rx, matcher, config).await;

    if let Err(e) = transport.stop_scan().await {
        warn!("Failed to stop scan: {}", e);
    }

    match &result {
        Ok((adv, reason)) => info!(
            "Found mask {} ({}) by {}",
            adv.name.as_deref().unwrap_or("UNNAMED"),
            adv.id,
            reason
        ),
        Err(e) => warn!("Scan ended without a match: {}", e),
    }

    result
}

/// Consume advertisements until a match is accepted.
async fn select_device(
    rx: &mut mpsc::Receiver<Advertisement>,
    matcher: &DeviceMatcher,
    config: &MaskConfig,
) -> Result<(Advertisement, MatchReason)> {
    let deadline = Instant::now() + config.scan_timeout;
    let mut candidate: Option<(Advertisement, MatchReason)> = None;
    let mut grace_deadline: Option<Instant> = None;

    loop {
        let wait_until = match grace_deadline {
            Some(grace) => grace.min(deadline),
            None => deadline,
        };

        let received = tokio::time::timeout_at(wait_until, rx.recv()).await;

        let first = match received {
            Ok(Some(adv)) => adv,
            Ok(None) => {
                debug!("Advertisement channel closed");
                return candidate.ok_or(Error::DeviceNotFound {
                    timeout: config.scan_timeout,
                });
            }
            Err(_) => {
                return candidate.ok_or(Error::DeviceNotFound {
                    timeout: config.scan_timeout,
                });
            }
        };

        // Everything already queued counts as seen together.
        let mut batch = vec![first];
        while let Ok(adv) = rx.try_recv() {
            batch.push(adv);
        }

        for adv in batch {
            let Some(reason) = matcher.evaluate(&adv) else {
                trace!("Ignoring advertisement {:?} ({})", adv.name, adv.id);
                continue;
            };

            let better = candidate
                .as_ref()
                .map(|(_, current)| reason < *current)
                .unwrap_or(true);
            if better {
                debug!("Candidate {} matched by {}", adv.id, reason);
                candidate = Some((adv, reason));
            }
        }

        match &candidate {
            Some((_, reason)) if reason.is_strong() => {
                return candidate.ok_or(Error::Internal("candidate vanished".to_string()));
            }
            Some(_) if grace_deadline.is_none() => {
                grace_deadline = Some(Instant::now() + config.fuzzy_match_grace);
            }
            _ => {}
        }
    }
}
