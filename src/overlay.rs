//! Variant change detection and the bounded reset cascade.
//!
//! When a segment a detail group depends on changes, the group's overlay
//! sites are re-resolved against the store. A site whose discriminator now
//! selects another variant has that variant reset to its defaults and the
//! group rebuilt. Resets write through the store and so propagate like any
//! other edit; the [`ResetGuard`] keeps that recursion finite.

use log::debug;

use crate::{
    address::Address,
    context::FixedContainer,
    error::{KitError, Result},
    store::DataStore,
    view::DetailGroup,
};

/// Capacity of the reset guard stack.
pub const MAX_RESET_DEPTH: usize = 8;

/// An overlay site whose active variant differs from the one a group was built for.
#[derive(Debug, Clone)]
pub struct VariantSwitch {
    /// Position of the site in [`DetailGroup::overlay_sites`].
    pub site: usize,
    /// Discriminator address identifying the site.
    pub address: Address,
    pub from: Option<i32>,
    pub to: Option<i32>,
    /// The newly active variant, if the discriminator selects one.
    pub variant: Option<FixedContainer>,
}

#[derive(Debug, Clone)]
pub enum VariantChange {
    Unchanged,
    Switched(VariantSwitch),
}

/// Compares each overlay site of `group` with the store, outermost first.
pub fn detect_change(group: &DetailGroup, store: &DataStore) -> Result<VariantChange> {
    for (site, recorded) in group.overlay_sites().iter().enumerate() {
        let current = recorded.host().active_variant(store)?;
        if current != recorded.variant() {
            debug!(
                "overlay at {} switched from {:?} to {:?}",
                recorded.address(),
                recorded.variant(),
                current
            );
            return Ok(VariantChange::Switched(VariantSwitch {
                site,
                address: recorded.address(),
                from: recorded.variant(),
                to: current,
                variant: recorded.host().variant(store)?,
            }));
        }
    }
    Ok(VariantChange::Unchanged)
}

/// Stack of overlay sites currently being reset.
///
/// Entering a site that is already on the stack means two resets keep
/// switching each other, and is an invariant violation, as is nesting
/// deeper than the configured limit.
#[derive(Debug, Clone)]
pub struct ResetGuard {
    active: heapless::Vec<Address, MAX_RESET_DEPTH>,
    limit: usize,
}

impl Default for ResetGuard {
    fn default() -> Self {
        Self::new(MAX_RESET_DEPTH)
    }
}

impl ResetGuard {
    /// `limit` is clamped to `1..=MAX_RESET_DEPTH`.
    pub fn new(limit: usize) -> Self {
        Self {
            active: heapless::Vec::new(),
            limit: limit.clamp(1, MAX_RESET_DEPTH),
        }
    }

    pub fn enter(&mut self, site: Address) -> Result<()> {
        if self.active.contains(&site) {
            return Err(KitError::invariant(format!(
                "overlay at {site} oscillates while resetting"
            )));
        }
        if self.active.len() >= self.limit {
            return Err(KitError::invariant(format!(
                "overlay resets nested deeper than {}",
                self.limit
            )));
        }
        self.active
            .push(site)
            .map_err(|_| KitError::invariant("reset guard full"))
    }

    /// Pops `site`, which must be the innermost entered site.
    pub fn exit(&mut self, site: Address) {
        debug_assert_eq!(self.active.last(), Some(&site), "unbalanced reset guard");
        self.active.pop();
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
