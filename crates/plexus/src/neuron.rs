// SPDX-License-Identifier: PolyForm-Shield-1.0

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use protocol::{Codec, Namespace};

use crate::error::PlexusError;

/// A statically typed handle to one logical channel: the binding of a user
/// type `T` to a [`Namespace`] and a [`Codec`].
///
/// Rust has no equivalent of looking up a value's class name at runtime, so
/// unlike the system this is modelled on, `type_name_alias` is not
/// optional here: it is the only source of the leaf segment that normally
/// comes from the type itself.
pub struct Neuron<T> {
    namespace: Namespace,
    codec: Arc<dyn Codec<T>>,
    type_name_alias: String,
    name: String,
    name_without_codec: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Neuron<T> {
    pub fn new(namespace: Namespace, codec: Arc<dyn Codec<T>>, type_name_alias: impl Into<String>) -> Self {
        let type_name_alias = type_name_alias.into();
        let name_without_codec = namespace.with_suffix([type_name_alias.clone()]);
        let name = format!("{name_without_codec}.{}", codec.name());
        Self {
            namespace,
            codec,
            type_name_alias,
            name,
            name_without_codec,
            _marker: PhantomData,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn type_name_alias(&self) -> &str {
        &self.type_name_alias
    }

    pub fn codec_name(&self) -> &str {
        self.codec.name()
    }

    /// Stable channel name, including the codec suffix. Used as the map
    /// key by every ganglion.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channel name without the codec suffix, used to correlate the same
    /// logical type carried by different codecs.
    pub fn name_without_codec(&self) -> &str {
        &self.name_without_codec
    }

    pub fn encode(&self, value: &T) -> Result<Vec<u8>, PlexusError> {
        Ok(self.codec.encode(value)?)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<T, PlexusError> {
        Ok(self.codec.decode(bytes)?)
    }
}

impl<T> Clone for Neuron<T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            codec: Arc::clone(&self.codec),
            type_name_alias: self.type_name_alias.clone(),
            name: self.name.clone(),
            name_without_codec: self.name_without_codec.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Neuron<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for Neuron<T> {}

impl<T> Hash for Neuron<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl<T> std::fmt::Debug for Neuron<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neuron").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::JsonCodec;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Sample;

    fn neuron() -> Neuron<Sample> {
        let ns = Namespace::new(["orders", "v2"]);
        let codec: Arc<dyn Codec<Sample>> = Arc::new(JsonCodec::new("json"));
        Neuron::new(ns, codec, "Sample")
    }

    #[test]
    fn name_includes_codec_suffix() {
        let n = neuron();
        assert_eq!(n.name(), "orders.v2.Sample.json");
        assert_eq!(n.name_without_codec(), "orders.v2.Sample");
    }

    #[test]
    fn equality_and_hash_follow_name() {
        let a = neuron();
        let b = neuron();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a.name().to_string());
        assert!(set.contains(b.name()));
    }
}
