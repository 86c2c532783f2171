// Copyright (c) The invocation-core Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The data an invocation carries with it from start to end: the devices it was allocated, the
//! builds fetched for them, and the free-form attributes accumulated along the way.

use crate::capability::Device;
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// A multi-valued attribute map: each key can carry more than one value, accumulated in
/// insertion order. Used for both invocation-level and module-level attributes, which build
/// tooling and preparers append to over the life of an invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttributeMultiMap {
    values: IndexMap<String, Vec<String>>,
}

impl AttributeMultiMap {
    /// Creates an empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value under `key`, preserving any values already present.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    /// Returns all values recorded under `key`, in insertion order.
    pub fn get(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates over every key and its values, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merges `other` into `self`, appending `other`'s values after any existing ones under the
    /// same key. Associative and the basis for the shard merger's build-attribute merge: merging
    /// is order-preserving but otherwise commutative on the *set* of keys touched.
    pub fn merge(&mut self, other: &AttributeMultiMap) {
        for (key, values) in other.iter() {
            for value in values {
                self.put(key, value.clone());
            }
        }
    }

    /// Flattens this map into a single-valued view, keeping only the last value recorded per
    /// key. Used where a consumer wants "last writer wins" semantics instead of the full
    /// multi-map.
    pub fn flatten_last_wins(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter_map(|(k, v)| v.last().map(|last| (k.clone(), last.clone())))
            .collect()
    }
}

/// Which build was fetched, and under what ID, for one device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildInfo {
    /// The build ID as requested from the [`crate::capability::BuildProvider`].
    pub build_id: String,
    /// The source branch the build was cut from, if the provider reports one.
    pub branch: Option<String>,
    /// The build flavor (e.g. `userdebug`, `eng`), if the provider reports one.
    pub flavor: Option<String>,
    /// An opaque tag identifying the test binaries bundled with this build, distinct from
    /// `build_id` since the same device image can ship with more than one test-tag cut.
    pub test_tag: Option<String>,
    /// Paths (relative to the build's root) of files whose exact identity is worth tracking
    /// across shards, so a merger can tell whether two shards actually ran against the same
    /// bits.
    pub versioned_files: BTreeSet<Utf8PathBuf>,
    /// Build-tool-reported properties, distinct from `attributes`: `properties` is what the
    /// provider itself reports at fetch time and is never mutated afterward, while `attributes`
    /// accumulates values contributed by preparers and other capabilities over the invocation's
    /// life.
    pub properties: BTreeMap<String, String>,
    /// A free-form set of build attributes (branch, target, build flavor) reported by the
    /// provider.
    pub attributes: BTreeMap<String, String>,
}

impl BuildInfo {
    /// Creates a new [`BuildInfo`] with no extra attributes.
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            branch: None,
            flavor: None,
            test_tag: None,
            versioned_files: BTreeSet::new(),
            properties: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the source branch, returning `self` for chaining.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the build flavor, returning `self` for chaining.
    pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
        self.flavor = Some(flavor.into());
        self
    }

    /// Sets the test tag, returning `self` for chaining.
    pub fn with_test_tag(mut self, test_tag: impl Into<String>) -> Self {
        self.test_tag = Some(test_tag.into());
        self
    }

    /// Records a versioned file, returning `self` for chaining.
    pub fn with_versioned_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.versioned_files.insert(path.into());
        self
    }

    /// Sets a build-tool-reported property, returning `self` for chaining.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds an attribute, returning `self` for chaining.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// The resolved identity of the configuration driving this invocation: its name and the command
/// line (or option map) it was invoked with, kept around purely for reporting.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigurationDescriptor {
    /// The configuration's name, e.g. the name of the test plan or suite definition.
    pub name: String,
    /// A rendering of the command line or option set the configuration was resolved from.
    pub command_line: String,
}

impl ConfigurationDescriptor {
    /// Creates a new descriptor.
    pub fn new(name: impl Into<String>, command_line: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command_line: command_line.into(),
        }
    }
}

/// The reserved attribute key under which the primary device's descriptor is recorded, so a
/// listener that only understands single-device invocations can still find one.
pub const PRIMARY_DEVICE_ATTRIBUTE: &str = "primary-device";

/// Everything one invocation needs: the devices allocated to it, the builds fetched for each,
/// and the attribute maps accumulated so far.
///
/// Construction enforces the primary-device invariant: when more than one device is allocated,
/// exactly one must be marked primary, or construction fails. A single-device invocation needs no
/// such marking; its one device is implicitly primary.
pub struct InvocationContext {
    devices: IndexMap<String, Arc<dyn Device>>,
    primary_device_descriptor: String,
    device_build_infos: BTreeMap<String, BuildInfo>,
    configuration: ConfigurationDescriptor,
    invocation_attributes: AttributeMultiMap,
}

impl InvocationContext {
    /// Builds a new context from its allocated devices, their fetched builds, and the
    /// configuration descriptor.
    ///
    /// `primary_device_descriptor` must name one of the keys in `devices`. If `devices` has more
    /// than one entry, a primary must be given; a single-entry `devices` map may pass that
    /// entry's own descriptor.
    pub fn new(
        devices: IndexMap<String, Arc<dyn Device>>,
        primary_device_descriptor: impl Into<String>,
        device_build_infos: BTreeMap<String, BuildInfo>,
        configuration: ConfigurationDescriptor,
    ) -> Result<Self, InvocationContextError> {
        if devices.is_empty() {
            return Err(InvocationContextError::NoDevicesAllocated);
        }

        let primary_device_descriptor = primary_device_descriptor.into();
        if !devices.contains_key(&primary_device_descriptor) {
            return Err(InvocationContextError::PrimaryDeviceNotAllocated {
                primary: primary_device_descriptor,
            });
        }

        for build_key in device_build_infos.keys() {
            if !devices.contains_key(build_key) {
                return Err(InvocationContextError::BuildInfoForUnknownDevice {
                    device: build_key.clone(),
                });
            }
        }

        Ok(Self {
            devices,
            primary_device_descriptor,
            device_build_infos,
            configuration,
            invocation_attributes: AttributeMultiMap::new(),
        })
    }

    /// Returns the primary device for this invocation: the sole device in a single-device
    /// invocation, or the one explicitly marked primary in a multi-device one.
    pub fn primary_device(&self) -> &Arc<dyn Device> {
        self.devices
            .get(&self.primary_device_descriptor)
            .expect("primary device descriptor was validated at construction")
    }

    /// Returns every allocated device, keyed by descriptor, in allocation order.
    pub fn devices(&self) -> &IndexMap<String, Arc<dyn Device>> {
        &self.devices
    }

    /// Returns the build fetched for `device_descriptor`, if one was recorded.
    pub fn build_info_for(&self, device_descriptor: &str) -> Option<&BuildInfo> {
        self.device_build_infos.get(device_descriptor)
    }

    /// Returns every per-device build info, keyed by device descriptor.
    pub fn device_build_infos(&self) -> &BTreeMap<String, BuildInfo> {
        &self.device_build_infos
    }

    /// Returns the configuration descriptor this invocation was resolved from.
    pub fn configuration(&self) -> &ConfigurationDescriptor {
        &self.configuration
    }

    /// Returns the accumulated invocation-level attribute map.
    pub fn invocation_attributes(&self) -> &AttributeMultiMap {
        &self.invocation_attributes
    }

    /// Appends an invocation-level attribute.
    pub fn add_invocation_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.invocation_attributes.put(key, value);
    }
}

/// An error raised while constructing an [`InvocationContext`].
#[derive(Clone, Debug, Error)]
pub enum InvocationContextError {
    /// No devices were allocated at all.
    #[error("an invocation context requires at least one allocated device")]
    NoDevicesAllocated,
    /// The named primary device descriptor does not match any allocated device. This is the
    /// invariant that resolves the "which device is primary in a hybrid multi-device config"
    /// question: construction fails fast rather than guessing.
    #[error("primary device `{primary}` is not among the allocated devices")]
    PrimaryDeviceNotAllocated {
        /// The descriptor that was given as primary.
        primary: String,
    },
    /// A build info entry was recorded for a device descriptor that isn't allocated.
    #[error("build info recorded for device `{device}`, which is not allocated")]
    BuildInfoForUnknownDevice {
        /// The unrecognized device descriptor.
        device: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DeviceBuildType;
    use async_trait::async_trait;

    struct FakeDevice {
        descriptor: String,
    }

    #[async_trait]
    impl Device for FakeDevice {
        fn device_descriptor(&self) -> &str {
            &self.descriptor
        }

        fn build_type(&self) -> DeviceBuildType {
            DeviceBuildType::UserDebug
        }

        async fn pre_invocation_setup(
            &self,
            _build_info: &BuildInfo,
        ) -> Result<(), crate::errors::DeviceSetupError> {
            Ok(())
        }

        async fn post_invocation_tear_down(&self, _cause: Option<&crate::errors::FailureDescription>) {}

        async fn reboot(&self) -> Result<(), crate::errors::DeviceSetupError> {
            Ok(())
        }

        async fn is_reachable(&self) -> bool {
            true
        }
    }

    fn fake_device(descriptor: &str) -> Arc<dyn Device> {
        Arc::new(FakeDevice {
            descriptor: descriptor.to_string(),
        })
    }

    #[test]
    fn single_device_context_constructs_with_itself_as_primary() {
        let mut devices = IndexMap::new();
        devices.insert("device0".to_string(), fake_device("device0"));

        let context = InvocationContext::new(
            devices,
            "device0",
            BTreeMap::new(),
            ConfigurationDescriptor::new("suite", "run --suite=everything"),
        )
        .expect("single device context should construct");

        assert_eq!(context.primary_device().device_descriptor(), "device0");
    }

    #[test]
    fn multi_device_context_requires_valid_primary() {
        let mut devices = IndexMap::new();
        devices.insert("device0".to_string(), fake_device("device0"));
        devices.insert("device1".to_string(), fake_device("device1"));

        let err = InvocationContext::new(
            devices,
            "device-that-does-not-exist",
            BTreeMap::new(),
            ConfigurationDescriptor::new("suite", "run"),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            InvocationContextError::PrimaryDeviceNotAllocated { .. }
        ));
    }

    #[test]
    fn build_info_for_unknown_device_is_rejected() {
        let mut devices = IndexMap::new();
        devices.insert("device0".to_string(), fake_device("device0"));

        let mut build_infos = BTreeMap::new();
        build_infos.insert("device1".to_string(), BuildInfo::new("1234"));

        let err = InvocationContext::new(
            devices,
            "device0",
            build_infos,
            ConfigurationDescriptor::new("suite", "run"),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            InvocationContextError::BuildInfoForUnknownDevice { .. }
        ));
    }

    #[test]
    fn attribute_multi_map_merge_preserves_both_sides_in_order() {
        let mut a = AttributeMultiMap::new();
        a.put("branch", "main");
        let mut b = AttributeMultiMap::new();
        b.put("branch", "release");
        b.put("flavor", "userdebug");

        a.merge(&b);

        assert_eq!(a.get("branch"), ["main", "release"]);
        assert_eq!(a.get("flavor"), ["userdebug"]);
    }

    #[test]
    fn flatten_last_wins_keeps_most_recent_value_per_key() {
        let mut map = AttributeMultiMap::new();
        map.put("k", "first");
        map.put("k", "second");

        let flat = map.flatten_last_wins();
        assert_eq!(flat.get("k"), Some(&"second".to_string()));
    }
}
