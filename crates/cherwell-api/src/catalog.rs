// Operation catalog
//
// The service describes its own operations at runtime. The catalog is the
// immutable result of that discovery: operation name -> ordered parameter
// names. Dispatch validates against it before anything touches the wire.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::Error;

/// Operations with a typed wrapper on [`RpcClient`](crate::RpcClient).
///
/// Wire names equal the variant names. Anything else the service exposes
/// stays reachable through [`RpcClient::call`](crate::RpcClient::call).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString, IntoStaticStr,
)]
pub enum KnownOperation {
    Login,
    Logout,
    GetLastError,
    GetBusinessObject,
    GetBusinessObjectByPublicId,
    UpdateBusinessObjectByPublicId,
    CreateBusinessObject,
    GetBusinessObjectDefinition,
}

/// One remote operation as discovered from the service description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    /// Parameter names in declaration order. Types are not tracked;
    /// every value travels as text.
    pub parameters: Vec<String>,
}

impl OperationDescriptor {
    pub fn new<I, S>(name: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
        }
    }
}

/// Arguments for a remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    /// Values matched to the operation's parameters by position.
    Positional(Vec<String>),
    /// Values already keyed by parameter name; passed through unchanged.
    Named(IndexMap<String, String>),
}

impl Args {
    /// No arguments.
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    pub fn positional<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Immutable map of the operations a service endpoint exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationCatalog {
    operations: BTreeMap<String, OperationDescriptor>,
}

impl OperationCatalog {
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = OperationDescriptor>) -> Self {
        let operations = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self { operations }
    }

    pub fn get(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Sorted operation names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Declared parameter names, or an empty slice for unknown operations
    /// and operations without parameters.
    pub fn parameters_for(&self, name: &str) -> &[String] {
        self.operations
            .get(name)
            .map(|d| d.parameters.as_slice())
            .unwrap_or_default()
    }

    /// Validate `operation` and map `args` onto its parameter names.
    pub fn bind(&self, operation: &str, args: Args) -> Result<IndexMap<String, String>, Error> {
        let descriptor = self
            .operations
            .get(operation)
            .ok_or_else(|| Error::UnknownOperation {
                operation: operation.to_owned(),
            })?;

        match args {
            Args::Named(map) => Ok(map),
            Args::Positional(values) => {
                if values.len() != descriptor.parameters.len() {
                    return Err(Error::ArityMismatch {
                        operation: operation.to_owned(),
                        expected: descriptor.parameters.len(),
                        got: values.len(),
                    });
                }
                Ok(descriptor
                    .parameters
                    .iter()
                    .cloned()
                    .zip(values)
                    .collect())
            }
        }
    }
}
