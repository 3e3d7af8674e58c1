// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod fixtures;
mod pipeline;
mod round_trip;
