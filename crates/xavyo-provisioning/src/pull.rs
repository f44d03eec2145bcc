//! Pull (reconciliation) applier.
//!
//! Turns connector change-feed deltas into internal record changes by
//! applying the provision's pull mapping items. Matching a pulled record to
//! an existing one and persisting it is left to the caller.

use std::sync::Arc;
use tracing::{debug, info, instrument};
use xavyo_connector::operation::{
    OperationOptions, SyncDelta, SyncDeltaType, SyncToken, Uid, PASSWORD,
};
use xavyo_connector::resource::Provision;
use xavyo_connector::traits::Connector;

use crate::any::AnyRecord;
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::mapping_manager::MappingManager;

/// A change pulled from a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledChange {
    pub delta_type: SyncDeltaType,
    pub uid: Uid,
    pub token: SyncToken,
    /// The pulled state; `None` for deletions.
    ///
    /// The record key is left empty for the caller to assign or correlate.
    pub record: Option<AnyRecord>,
}

/// Applies pulled deltas through a mapping manager.
#[derive(Debug, Clone)]
pub struct PullApplier {
    mapping: Arc<MappingManager>,
}

impl PullApplier {
    pub fn new(mapping: Arc<MappingManager>) -> Self {
        Self { mapping }
    }

    /// Convert one delta into a pulled change.
    pub fn apply(&self, provision: &Provision, delta: &SyncDelta) -> ProvisioningResult<PulledChange> {
        let record = match (&delta.delta_type, &delta.object) {
            (SyncDeltaType::Delete, _) | (_, None) => None,
            (_, Some(object)) => {
                let mapping = provision.mapping.as_ref().ok_or_else(|| {
                    ProvisioningError::MissingConnObjectKeyMapping {
                        any_type: provision.any_type.clone(),
                    }
                })?;

                let mut record =
                    AnyRecord::new(String::new(), provision.any_type_kind, &provision.any_type);
                for item in mapping.pull_items() {
                    let attribute = object.attribute(&item.ext_attr_name).or_else(|| {
                        item.password.then(|| object.attribute(PASSWORD)).flatten()
                    });
                    let Some(attribute) = attribute else {
                        continue;
                    };
                    self.mapping
                        .apply_inbound_attribute(item, &attribute, &mut record)?;
                }
                Some(record)
            }
        };

        debug!(
            uid = %delta.uid.value(),
            delta_type = %delta.delta_type,
            "Applied pulled delta"
        );

        Ok(PulledChange {
            delta_type: delta.delta_type,
            uid: delta.uid.clone(),
            token: delta.token.clone(),
            record,
        })
    }

    /// Pull changes for the provision's object class.
    ///
    /// With a token the native change feed is read from that position;
    /// without one a full reconciliation is run. Returns the changes and
    /// the last non-empty token seen.
    #[instrument(skip_all, fields(any_type = %provision.any_type))]
    pub async fn pull(
        &self,
        connector: &dyn Connector,
        provision: &Provision,
        token: Option<&SyncToken>,
    ) -> ProvisioningResult<(Vec<PulledChange>, Option<SyncToken>)> {
        let mut deltas = Vec::new();
        let mut collect = |delta: SyncDelta| {
            deltas.push(delta);
            true
        };

        let options = OperationOptions::new();
        match token {
            Some(token) => {
                connector
                    .sync(&provision.object_class, token, &mut collect, &options)
                    .await?
            }
            None => {
                connector
                    .full_reconciliation(&provision.object_class, &mut collect, &options)
                    .await?
            }
        }

        let latest = deltas
            .iter()
            .rev()
            .map(|d| &d.token)
            .find(|t| !t.is_empty())
            .cloned();

        let changes = deltas
            .iter()
            .map(|delta| self.apply(provision, delta))
            .collect::<ProvisioningResult<Vec<_>>>()?;

        info!(changes = changes.len(), "Pulled changes");
        Ok((changes, latest))
    }
}
