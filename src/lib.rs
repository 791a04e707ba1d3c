/*
 * ClusterGate - Cluster Readiness Operator
 * Copyright (C) 2025 ClusterGate Authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! ClusterGate core library
//!
//! Continuously evaluates a declarative catalogue of readiness checks against
//! a Kubernetes cluster and publishes a single aggregated verdict through the
//! `ClusterReadiness` status, Prometheus metrics, and an HTTP readiness probe.

pub mod checks;
pub mod config;
pub mod crds;
pub mod gates;
pub mod metrics;
pub mod server;

// Re-export commonly used types
pub use config::ControllerConfig;
pub use crds::{ClusterReadiness, GateCheck, GateProfile, HealthState, Severity};
pub use gates::run_gate_controllers;
