// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Prelude module with the extension trait and the option types its methods take

pub use crate::group_by::GroupRetention;
pub use crate::map_concurrent::MapOrdering;
pub use crate::queue::{
    Backpressure, LeastRecent, LeastRecentBatch, MostRecent, MostRecentBatch, QueuePolicy,
    ThrowOnFull,
};
pub use crate::source_ext::SourceExt;
