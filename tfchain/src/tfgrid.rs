use subxt::dynamic::Value as DynamicValue;
use subxt::ext::scale_value::{At, Primitive, Value, ValueDef};
use subxt::utils::AccountId32;

use crate::client::SubstrateClient;
use crate::error::{Error, Result};

/// Tfgrid records are versioned structs that keep growing fields across
/// runtime upgrades; only the fields the deposit memo routing needs are
/// extracted here, by name, so unrelated churn does not break decoding.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Twin {
    pub id: u32,
    pub account: AccountId32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Farm {
    pub id: u32,
    pub twin_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: u32,
    pub twin_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: u32,
    pub account: AccountId32,
}

impl SubstrateClient {
    pub async fn get_twin(&self, id: u32) -> Result<Twin> {
        let value = self
            .fetch_storage("TfgridModule", "Twins", vec![DynamicValue::u128(id.into())])
            .await?
            .ok_or(Error::TwinNotFound(id))?
            .to_value()?;
        let account = account_at(&value, "account_id")
            .ok_or_else(|| Error::Decode(format!("twin {id} has no account_id")))?;
        Ok(Twin { id, account })
    }

    pub async fn get_farm(&self, id: u32) -> Result<Farm> {
        let value = self
            .fetch_storage("TfgridModule", "Farms", vec![DynamicValue::u128(id.into())])
            .await?
            .ok_or(Error::FarmNotFound(id))?
            .to_value()?;
        let twin_id = uint_at(&value, "twin_id")
            .ok_or_else(|| Error::Decode(format!("farm {id} has no twin_id")))?;
        Ok(Farm {
            id,
            twin_id: twin_id as u32,
        })
    }

    pub async fn get_node(&self, id: u32) -> Result<Node> {
        let value = self
            .fetch_storage("TfgridModule", "Nodes", vec![DynamicValue::u128(id.into())])
            .await?
            .ok_or(Error::NodeNotFound(id))?
            .to_value()?;
        let twin_id = uint_at(&value, "twin_id")
            .ok_or_else(|| Error::Decode(format!("node {id} has no twin_id")))?;
        Ok(Node {
            id,
            twin_id: twin_id as u32,
        })
    }

    pub async fn get_entity(&self, id: u32) -> Result<Entity> {
        let value = self
            .fetch_storage(
                "TfgridModule",
                "Entities",
                vec![DynamicValue::u128(id.into())],
            )
            .await?
            .ok_or(Error::EntityNotFound(id))?
            .to_value()?;
        let account = account_at(&value, "account_id")
            .ok_or_else(|| Error::Decode(format!("entity {id} has no account_id")))?;
        Ok(Entity { id, account })
    }
}

fn uint_at<T>(value: &Value<T>, field: &str) -> Option<u64> {
    match &value.at(field)?.value {
        ValueDef::Primitive(Primitive::U128(n)) => Some(*n as u64),
        _ => None,
    }
}

/// An `AccountId32` decodes as nested composites around 32 byte primitives;
/// flatten whatever shape the runtime picked and take the bytes.
fn account_at<T>(value: &Value<T>, field: &str) -> Option<AccountId32> {
    let mut bytes = Vec::with_capacity(32);
    collect_bytes(value.at(field)?, &mut bytes);
    let raw: [u8; 32] = bytes.try_into().ok()?;
    Some(AccountId32(raw))
}

fn collect_bytes<T>(value: &Value<T>, out: &mut Vec<u8>) {
    match &value.value {
        ValueDef::Composite(composite) => {
            for inner in composite.values() {
                collect_bytes(inner, out);
            }
        }
        ValueDef::Primitive(Primitive::U128(n)) => out.push(*n as u8),
        _ => {}
    }
}
