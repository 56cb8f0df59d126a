// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod file;
pub mod memory;
pub mod null;
pub mod socket;
