// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod admin;
pub mod balances;
pub mod daily;
pub mod doctor;
pub mod exporter;
pub mod notifications;
pub mod plans;
pub mod prices;
pub mod settings;
pub mod sweep;
pub mod transactions;
pub mod wallets;
