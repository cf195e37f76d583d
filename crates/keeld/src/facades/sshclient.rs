//! `SSHClient` v2 and v3: address and leadership lookups for SSH tooling.

use keel_rpc_types::ErrorBody;
use serde::Serialize;

use crate::auth::Access;
use crate::names::Tag;
use crate::registry::{Context, FacadeError, FacadeRegistry, MethodTable, RegistryError};
use crate::state::Machine;

use super::{Entities, EntityTag};

pub(super) fn register(registry: &mut FacadeRegistry) -> Result<(), RegistryError> {
    registry.register("SSHClient", 2, SshClient::build, address_methods())?;
    let v3 = address_methods().method("Leader", |client: &SshClient, params: Entities| {
        Ok(client.leaders(&params))
    });
    registry.register("SSHClient", 3, SshClient::build, v3)
}

fn address_methods() -> MethodTable<SshClient> {
    MethodTable::new()
        .method("PublicAddress", |client: &SshClient, params: Entities| {
            Ok(client.addresses(&params, Address::Public))
        })
        .method("PrivateAddress", |client: &SshClient, params: Entities| {
            Ok(client.addresses(&params, Address::Private))
        })
        .method("AllAddresses", |client: &SshClient, params: Entities| {
            Ok(client.all_addresses(&params))
        })
}

/// Per-entity outcome in a bulk call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringResult {
    /// The value when the lookup succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// The failure otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Per-entity list outcome in a bulk call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringsResult {
    /// The values when the lookup succeeded.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub result: Vec<String>,
    /// The failure otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Bulk results, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Results<T> {
    /// One entry per requested entity.
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Copy)]
enum Address {
    Public,
    Private,
}

struct SshClient {
    context: Context,
}

impl SshClient {
    fn build(context: &Context) -> Result<Self, FacadeError> {
        let auth = context.auth();
        if !auth.auth_client() {
            return Err(FacadeError::PermissionDenied);
        }
        auth.check_permission(Access::Admin, &context.model_tag()?)?;
        Ok(Self {
            context: context.clone(),
        })
    }

    fn addresses(&self, params: &Entities, which: Address) -> Results<StringResult> {
        let results = params
            .entities
            .iter()
            .map(|entity| string_result(self.address(entity, which)))
            .collect();
        Results { results }
    }

    fn address(&self, entity: &EntityTag, which: Address) -> Result<String, FacadeError> {
        let state = self.context.state();
        let missing = || FacadeError::NotFound(format!("no {} address for {}", which.label(), entity.tag));
        match entity.parse()? {
            Tag::Unit(name) => {
                let unit = state.unit(&name)?;
                let own = match which {
                    Address::Public => unit.public_address,
                    Address::Private => unit.private_address,
                };
                if let Some(address) = own {
                    return Ok(address);
                }
                let machine_id = unit.machine.ok_or_else(missing)?;
                which.of(state.machine(&machine_id)?).ok_or_else(missing)
            }
            Tag::Machine(id) => which.of(state.machine(&id)?).ok_or_else(missing),
            other => Err(unsupported(&other)),
        }
    }

    fn all_addresses(&self, params: &Entities) -> Results<StringsResult> {
        let results = params
            .entities
            .iter()
            .map(|entity| match self.machine_for(entity) {
                Ok(machine) => StringsResult {
                    result: machine.addresses,
                    error: None,
                },
                Err(error) => StringsResult {
                    result: Vec::new(),
                    error: Some(error.to_body()),
                },
            })
            .collect();
        Results { results }
    }

    fn machine_for(&self, entity: &EntityTag) -> Result<Machine, FacadeError> {
        let state = self.context.state();
        match entity.parse()? {
            Tag::Unit(name) => {
                let unit = state.unit(&name)?;
                let machine_id = unit.machine.ok_or_else(|| {
                    FacadeError::NotFound(format!("unit {name} is not assigned to a machine"))
                })?;
                Ok(state.machine(&machine_id)?)
            }
            Tag::Machine(id) => Ok(state.machine(&id)?),
            other => Err(unsupported(&other)),
        }
    }

    fn leaders(&self, params: &Entities) -> Results<StringResult> {
        let results = params
            .entities
            .iter()
            .map(|entity| string_result(self.leader(entity)))
            .collect();
        Results { results }
    }

    fn leader(&self, entity: &EntityTag) -> Result<String, FacadeError> {
        let Tag::Application(name) = entity.parse()? else {
            return Err(FacadeError::bad_request(format!(
                "{} is not an application tag",
                entity.tag
            )));
        };
        self.context
            .state()
            .application(&name)?
            .leader
            .ok_or_else(|| FacadeError::NotFound(format!("application {name} has no leader")))
    }
}

impl Address {
    const fn label(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }

    fn of(self, machine: Machine) -> Option<String> {
        match self {
            Self::Public => machine.public_address,
            Self::Private => machine.private_address,
        }
    }
}

fn unsupported(tag: &Tag) -> FacadeError {
    FacadeError::bad_request(format!("entity {tag} has no addresses"))
}

fn string_result(outcome: Result<String, FacadeError>) -> StringResult {
    match outcome {
        Ok(value) => StringResult {
            result: Some(value),
            error: None,
        },
        Err(error) => StringResult {
            result: None,
            error: Some(error.to_body()),
        },
    }
}
