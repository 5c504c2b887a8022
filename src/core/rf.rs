/// RF environment control
///
/// Owns every attenuation write for the run. Exactly one pair holds the
/// active/passive roles at a time; every other attenuator, configured or merely
/// discovered on the controller, is pinned at the maximum attenuation.
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use crate::{
    api::traits::DeviceController,
    core::{error::RoamError, schedule::AttenuatorPair, types::AttenuatorId},
};

/// Active/passive role labels for the pair currently under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roles {
    pub active: AttenuatorId,
    pub passive: AttenuatorId,
}

impl Roles {
    /// Exchange the labels; the attenuators themselves are not touched.
    pub fn swap(self) -> Self {
        Self {
            active: self.passive,
            passive: self.active,
        }
    }
}

pub struct RfEnvironment {
    controller: Arc<dyn DeviceController>,
    configured: Vec<AttenuatorId>,
    inventory: BTreeSet<AttenuatorId>,
    applied: BTreeMap<AttenuatorId, u32>,
    max_attenuation: u32,
}

impl RfEnvironment {
    /// Check the configured attenuators against the live inventory, then park
    /// every other attached attenuator at the maximum.
    ///
    /// Nothing is written unless every configured attenuator is present.
    pub async fn discover(
        controller: Arc<dyn DeviceController>,
        configured: Vec<AttenuatorId>,
        max_attenuation: u32,
    ) -> Result<Self, RoamError> {
        let listed = controller
            .list_attenuators()
            .await
            .map_err(|err| RoamError::Controller {
                reason: format!("cannot list attenuators: {err:#}"),
            })?;

        let inventory: BTreeSet<AttenuatorId> = listed
            .iter()
            .filter(|info| !info.is_phantom())
            .map(|info| info.serial.clone())
            .collect();

        if let Some(missing) = configured
            .iter()
            .find(|id| !inventory.iter().any(|known| known.same_device(id)))
        {
            return Err(RoamError::UnknownAttenuator {
                serial: missing.to_string(),
            });
        }

        let mut env = Self {
            controller,
            configured,
            inventory,
            applied: BTreeMap::new(),
            max_attenuation,
        };

        let strays: Vec<AttenuatorId> = env
            .inventory
            .iter()
            .filter(|known| !env.configured.iter().any(|id| id.same_device(known)))
            .cloned()
            .collect();
        for stray in strays {
            log::info!(
                "Attenuator {stray} is not in the test attenuator list, setting it to {}",
                env.max_attenuation
            );
            env.set_attenuation(&stray, env.max_attenuation).await?;
        }

        Ok(env)
    }

    /// The inventory entry for `device`; a bare serial matches its `1.1.<serial>` entity id.
    fn resolve(&self, device: &AttenuatorId) -> Option<AttenuatorId> {
        self.inventory
            .iter()
            .find(|known| known.same_device(device))
            .cloned()
    }

    /// Last value written to a device, if any.
    pub fn value(&self, device: &AttenuatorId) -> Option<u32> {
        self.resolve(device)
            .and_then(|target| self.applied.get(&target).copied())
    }

    /// Write one attenuator. Repeating the last written value is a no-op.
    pub async fn set_attenuation(
        &mut self,
        device: &AttenuatorId,
        value: u32,
    ) -> Result<(), RoamError> {
        let target = self
            .resolve(device)
            .ok_or_else(|| RoamError::UnknownAttenuator {
                serial: device.to_string(),
            })?;
        if value > self.max_attenuation {
            return Err(RoamError::Controller {
                reason: format!(
                    "attenuation {value} for {device} exceeds the maximum {}",
                    self.max_attenuation
                ),
            });
        }
        if self.applied.get(&target) == Some(&value) {
            return Ok(());
        }

        log::debug!("Setting attenuation to {value} for attenuator {target}");
        self.controller
            .set_attenuation(&target, value)
            .await
            .map_err(|err| RoamError::Controller {
                reason: format!("cannot set {target} to {value}: {err:#}"),
            })?;
        self.applied.insert(target, value);
        Ok(())
    }

    /// Put `pair` in role: active to 0, passive to the maximum, every other
    /// configured attenuator to the maximum.
    pub async fn assign_roles(&mut self, pair: &AttenuatorPair) -> Result<Roles, RoamError> {
        let max = self.max_attenuation;
        self.set_attenuation(&pair.active, 0).await?;
        log::info!("Setting active attenuator as {}", pair.active);
        self.set_attenuation(&pair.passive, max).await?;
        log::info!("Setting passive attenuator as {}", pair.passive);

        let unused: Vec<AttenuatorId> = self
            .configured
            .iter()
            .filter(|id| **id != pair.active && **id != pair.passive)
            .cloned()
            .collect();
        for id in unused {
            log::info!("Setting unused attenuator {id} value to maximum attenuation");
            self.set_attenuation(&id, max).await?;
        }

        Ok(Roles {
            active: pair.active.clone(),
            passive: pair.passive.clone(),
        })
    }

    /// Apply one ramp position to the pair in role.
    pub async fn apply_step(
        &mut self,
        roles: &Roles,
        active_value: u32,
        passive_value: u32,
    ) -> Result<(), RoamError> {
        self.set_attenuation(&roles.active, active_value).await?;
        self.set_attenuation(&roles.passive, passive_value).await
    }
}
