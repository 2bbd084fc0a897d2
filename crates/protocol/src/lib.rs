// SPDX-License-Identifier: PolyForm-Shield-1.0

//! Wire-level building blocks shared by every layer of the fabric: the
//! [`Namespace`] type used to derive stable channel names, the [`Codec`]
//! trait payloads are carried through, and the control-plane record types
//! the multicast ganglion uses to run its address-allocation protocol.

pub mod codec;
pub mod control;
pub mod namespace;

pub use codec::{Codec, CodecError, JsonCodec, StringCodec};
pub use control::{Approval, Heartbeat, Preparation, Promise, Proposal, Rejection};
pub use namespace::Namespace;
