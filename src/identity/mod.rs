// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External identity linking.

pub mod linker;
pub mod profile;

pub use linker::{IdentityLinker, LinkError, LinkOutcome, LinkPolicy, LinkedIdentity};
pub use profile::ProviderIdentity;
