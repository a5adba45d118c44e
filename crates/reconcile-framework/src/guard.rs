//! Diff guards: transitions the remote service cannot perform in place.
//!
//! - [`CollectionGuard`] for named collections the service cannot shrink.
//! - [`ReplacementGuard`] for fields the service fixes when the object is created.

use crate::error::TransitionError;

/// Rejects plans that remove entries from a named collection.
#[derive(Debug, Clone, Copy)]
pub struct CollectionGuard {
    /// e.g. "secret"
    pub singular: &'static str,
    /// e.g. "secrets"
    pub plural: &'static str,
    /// e.g. "Container Apps"
    pub owner: &'static str,
}

impl CollectionGuard {
    pub const fn new(singular: &'static str, plural: &'static str, owner: &'static str) -> Self {
        Self {
            singular,
            plural,
            owner,
        }
    }

    /// Check the entry names of the prior and proposed collections.
    pub fn check<'a, P, N>(&self, prior: P, proposed: N) -> Result<(), TransitionError>
    where
        P: IntoIterator<Item = &'a str>,
        N: IntoIterator<Item = &'a str>,
    {
        let prior: Vec<&str> = prior.into_iter().collect();
        let proposed: Vec<&str> = proposed.into_iter().collect();
        let removed = removed_names(&prior, &proposed);
        if removed.is_empty() {
            return Ok(());
        }

        let message = if proposed.len() < prior.len() {
            format!(
                "cannot remove {} from {} at this time, the following were removed: {}",
                self.plural,
                self.owner,
                removed.join(", ")
            )
        } else {
            format!(
                "previously configured {} {:?} was removed. Removing {} is not supported by {} at this time",
                self.singular, removed[0], self.plural, self.owner
            )
        };

        Err(TransitionError {
            names: removed,
            message,
        })
    }
}

/// Rejects plans that change fields only a delete and re-create can change.
#[derive(Debug, Clone, Copy)]
pub struct ReplacementGuard {
    /// e.g. "Managed Environments"
    pub owner: &'static str,
}

impl ReplacementGuard {
    pub const fn new(owner: &'static str) -> Self {
        Self { owner }
    }

    /// `fields` pairs each creation-only field with whether the plan changes it.
    pub fn check<'a, F>(&self, fields: F) -> Result<(), TransitionError>
    where
        F: IntoIterator<Item = (&'a str, bool)>,
    {
        let changed: Vec<String> = fields
            .into_iter()
            .filter(|(_, changed)| *changed)
            .map(|(field, _)| field.to_string())
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        let message = format!(
            "{} cannot be changed on existing {}; delete the resource and create it again",
            changed.join(", "),
            self.owner
        );
        Err(TransitionError {
            names: changed,
            message,
        })
    }
}

/// Names present in `prior` and absent from `proposed`, in prior order.
pub fn removed_names(prior: &[&str], proposed: &[&str]) -> Vec<String> {
    prior
        .iter()
        .filter(|name| !proposed.contains(*name))
        .map(|name| name.to_string())
        .collect()
}
