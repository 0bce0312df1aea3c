// tempids and pending attributes are resolved through maps
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

// every transaction is stamped with the instant it was prepared
use chrono::{DateTime, Utc};

// attribute idents are checked against a pattern compiled once
use lazy_static::lazy_static;
use regex::Regex;

// assertions arrive as JSON records
use serde::Deserialize;
use serde_json::Value as Json;

use tracing::{info, warn};

// our own stuff that we need
use crate::construct::{
    Attribute, Database, Datom, Thing, DB_CARDINALITY, DB_DOC, DB_IDENT, DB_TX_INSTANT,
    DB_VALUE_TYPE,
};
use crate::datatype::{Cardinality, Value, ValueType};
use crate::error::{ComicdbError, Result};

lazy_static! {
    static ref IDENT: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_.\-]*/[A-Za-z][A-Za-z0-9_.\-?!]*$").unwrap();
}

// ------------- Transaction -------------
// A transaction is an ordered list of assertions. Entities are named either
// by tempids, scoped to the transaction, or by the identity of an entity that
// already exists. Assertions on db/ident, db/valueType, db/cardinality and
// db/doc install attributes; all other assertions must use installed
// attributes. Everything is validated before anything is applied.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum EntityRef {
    Id(Thing),
    Temp(String),
}
impl From<&str> for EntityRef {
    fn from(tempid: &str) -> Self {
        EntityRef::Temp(tempid.to_string())
    }
}
impl From<Thing> for EntityRef {
    fn from(thing: Thing) -> Self {
        EntityRef::Id(thing)
    }
}

/// One (entity, attribute, value) record, `{"e": .., "a": .., "v": ..}` in fixtures.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Assertion {
    #[serde(rename = "e")]
    pub entity: EntityRef,
    #[serde(rename = "a")]
    pub attribute: String,
    #[serde(rename = "v")]
    pub value: Json,
}
impl Assertion {
    pub fn new(entity: impl Into<EntityRef>, attribute: &str, value: impl Into<Json>) -> Self {
        Self {
            entity: entity.into(),
            attribute: attribute.to_string(),
            value: value.into(),
        }
    }
    fn ident(&self) -> &str {
        self.attribute
            .strip_prefix(':')
            .unwrap_or(&self.attribute)
    }
}

#[derive(Debug, Clone)]
pub struct TxReport {
    pub tx: Thing,
    pub tx_instant: DateTime<Utc>,
    pub tempids: HashMap<String, Thing>,
    pub datoms: usize,
}
impl TxReport {
    pub fn tempid(&self, tempid: &str) -> Option<Thing> {
        self.tempids.get(tempid).copied()
    }
}

// A validated transaction, ready to be mirrored and applied.
pub(crate) struct PreparedTx {
    pub(crate) tx: Thing,
    pub(crate) tx_instant: DateTime<Utc>,
    pub(crate) attributes: Vec<Arc<Attribute>>,
    pub(crate) retractions: Vec<Arc<Datom>>,
    pub(crate) datoms: Vec<Datom>,
}

#[derive(Default)]
struct Tempids {
    resolved: HashMap<String, Thing>,
    generated: Vec<Thing>,
}

struct AttributeDraft {
    origin: EntityRef,
    ident: Option<String>,
    value_type: Option<ValueType>,
    cardinality: Option<Cardinality>,
    doc: Option<String>,
}

fn is_schema(ident: &str) -> bool {
    matches!(ident, DB_IDENT | DB_VALUE_TYPE | DB_CARDINALITY | DB_DOC)
}

// sets a draft field once, rejecting a second, different value
fn settle<T: PartialEq + std::fmt::Debug>(
    field: &mut Option<T>,
    value: T,
    ident: &str,
    index: usize,
) -> Result<()> {
    match field {
        Some(existing) if *existing != value => Err(ComicdbError::load(format!(
            "Conflicting values {:?} and {:?} for :{} in assertion #{}",
            existing, value, ident, index
        ))),
        _ => {
            *field = Some(value);
            Ok(())
        }
    }
}

fn keyword(assertion: &Assertion, index: usize) -> Result<String> {
    match Value::from_json(&assertion.value, ValueType::Keyword) {
        Some(Value::Keyword(k)) => Ok(k),
        _ => Err(ComicdbError::load(format!(
            "Value {} of assertion #{} is not a keyword for :{}",
            assertion.value,
            index,
            assertion.ident()
        ))),
    }
}

impl Database {
    /// Validates and applies one transaction.
    ///
    /// Either every assertion is applied or none is; identities generated
    /// for a rejected transaction are released again.
    pub fn transact(&mut self, assertions: &[Assertion]) -> Result<TxReport> {
        let mut tempids = Tempids::default();
        let outcome = self
            .prepare(assertions, &mut tempids)
            .and_then(|prepared| {
                let tx = prepared.tx;
                let tx_instant = prepared.tx_instant;
                let added = self.commit(prepared)?;
                Ok((tx, tx_instant, added))
            });
        match outcome {
            Ok((tx, tx_instant, datoms)) => {
                info!(tx, datoms, assertions = assertions.len(), "transaction committed");
                Ok(TxReport {
                    tx,
                    tx_instant,
                    tempids: tempids.resolved,
                    datoms,
                })
            }
            Err(e) => {
                for thing in tempids.generated {
                    self.thing_generator.release(thing);
                }
                warn!(error = %e, "transaction rejected");
                Err(e)
            }
        }
    }

    fn prepare(&mut self, assertions: &[Assertion], tempids: &mut Tempids) -> Result<PreparedTx> {
        let tx = self.thing_generator.generate();
        tempids.generated.push(tx);
        let tx_instant = Utc::now();

        // every tempid used as an entity names a new thing
        for (index, assertion) in assertions.iter().enumerate() {
            match &assertion.entity {
                EntityRef::Temp(tempid) => {
                    if let Entry::Vacant(e) = tempids.resolved.entry(tempid.clone()) {
                        let thing = self.thing_generator.generate();
                        tempids.generated.push(thing);
                        e.insert(thing);
                    }
                }
                EntityRef::Id(thing) => {
                    if self.thing_generator.check(*thing).is_none() {
                        return Err(ComicdbError::load(format!(
                            "Unknown entity {} in assertion #{}",
                            thing, index
                        )));
                    }
                }
            }
        }

        let installed = self.install(assertions, tempids)?;
        let mut pending: HashMap<&str, Arc<Attribute>> = HashMap::new();
        for attribute in &installed {
            pending.insert(attribute.ident(), Arc::clone(attribute));
        }

        let mut datoms = Vec::new();
        let mut singles: HashMap<(Thing, Thing), Value> = HashMap::new();
        for (index, assertion) in assertions.iter().enumerate() {
            let ident = assertion.ident();
            if is_schema(ident) {
                continue;
            }
            let attribute = match pending.get(ident) {
                Some(attribute) => Arc::clone(attribute),
                None => self.attribute_keeper.get(ident).ok_or_else(|| {
                    ComicdbError::load(format!(
                        "Unknown attribute :{} in assertion #{}",
                        ident, index
                    ))
                })?,
            };
            if attribute.reserved() {
                return Err(ComicdbError::load(format!(
                    "Attribute :{} is reserved, in assertion #{}",
                    ident, index
                )));
            }
            let entity = self.entity_of(&assertion.entity, tempids);
            let value = self.value_of(assertion, &attribute, tempids, index)?;
            if attribute.cardinality() == Cardinality::One {
                match singles.entry((entity, attribute.attribute())) {
                    Entry::Occupied(e) if *e.get() != value => {
                        return Err(ComicdbError::load(format!(
                            "Conflicting values {} and {} for :{} on entity {} in assertion #{}",
                            e.get(),
                            value,
                            ident,
                            entity,
                            index
                        )));
                    }
                    Entry::Occupied(_) => continue,
                    Entry::Vacant(e) => {
                        e.insert(value.clone());
                    }
                }
            }
            datoms.push(Datom::new(entity, attribute, value, tx));
        }

        for attribute in &installed {
            datoms.extend(self.describe(attribute, tx)?);
        }
        datoms.push(Datom::new(
            tx,
            self.resolve(DB_TX_INSTANT)?,
            Value::Instant(tx_instant),
            tx,
        ));

        // cardinality one: a new value replaces whatever was there before
        let mut retractions = Vec::new();
        for datom in &datoms {
            let attribute = datom.attribute();
            if attribute.cardinality() == Cardinality::One {
                for existing in self.current(datom.entity(), attribute.attribute()) {
                    if existing.value() != datom.value() {
                        retractions.push(existing);
                    }
                }
            }
        }

        Ok(PreparedTx {
            tx,
            tx_instant,
            attributes: installed,
            retractions,
            datoms,
        })
    }

    // Collects the attribute definitions of a transaction and returns the
    // attributes it installs. Identical re-definitions resolve to the
    // attribute already installed.
    fn install(
        &mut self,
        assertions: &[Assertion],
        tempids: &mut Tempids,
    ) -> Result<Vec<Arc<Attribute>>> {
        let mut drafts: Vec<(Thing, AttributeDraft)> = Vec::new();
        let mut positions: HashMap<Thing, usize> = HashMap::new();
        for (index, assertion) in assertions.iter().enumerate() {
            let ident = assertion.ident();
            if !is_schema(ident) {
                continue;
            }
            let entity = self.entity_of(&assertion.entity, tempids);
            let position = *positions.entry(entity).or_insert_with(|| {
                drafts.push((
                    entity,
                    AttributeDraft {
                        origin: assertion.entity.clone(),
                        ident: None,
                        value_type: None,
                        cardinality: None,
                        doc: None,
                    },
                ));
                drafts.len() - 1
            });
            let draft = &mut drafts[position].1;
            match ident {
                DB_IDENT => settle(&mut draft.ident, keyword(assertion, index)?, ident, index)?,
                DB_VALUE_TYPE => {
                    let k = keyword(assertion, index)?;
                    let value_type = ValueType::from_ident(&k).ok_or_else(|| {
                        ComicdbError::load(format!(
                            "Unknown value type :{} in assertion #{}",
                            k, index
                        ))
                    })?;
                    settle(&mut draft.value_type, value_type, ident, index)?
                }
                DB_CARDINALITY => {
                    let k = keyword(assertion, index)?;
                    let cardinality = Cardinality::from_ident(&k).ok_or_else(|| {
                        ComicdbError::load(format!(
                            "Unknown cardinality :{} in assertion #{}",
                            k, index
                        ))
                    })?;
                    settle(&mut draft.cardinality, cardinality, ident, index)?
                }
                _ => {
                    let doc = match &assertion.value {
                        Json::String(s) => s.clone(),
                        other => {
                            return Err(ComicdbError::load(format!(
                                "Value {} of assertion #{} is not a string for :{}",
                                other, index, DB_DOC
                            )));
                        }
                    };
                    settle(&mut draft.doc, doc, ident, index)?
                }
            }
        }

        let mut installed: Vec<Arc<Attribute>> = Vec::new();
        for (entity, draft) in drafts {
            let ident = draft.ident.ok_or_else(|| {
                ComicdbError::load(format!(
                    "Entity {:?} describes an attribute without :{}",
                    draft.origin, DB_IDENT
                ))
            })?;
            if !IDENT.is_match(&ident) {
                return Err(ComicdbError::load(format!(
                    "Invalid attribute ident :{}, expected namespace/name",
                    ident
                )));
            }
            if ident.starts_with("db/") || ident.starts_with("db.") {
                return Err(ComicdbError::load(format!(
                    "Attribute ident :{} is in a reserved namespace",
                    ident
                )));
            }
            let (value_type, cardinality) = match (draft.value_type, draft.cardinality) {
                (Some(value_type), Some(cardinality)) => (value_type, cardinality),
                _ => {
                    return Err(ComicdbError::load(format!(
                        "Attribute :{} needs both :{} and :{}",
                        ident, DB_VALUE_TYPE, DB_CARDINALITY
                    )));
                }
            };
            if installed.iter().any(|a| a.ident() == ident) {
                return Err(ComicdbError::load(format!(
                    "Attribute :{} is defined twice in one transaction",
                    ident
                )));
            }
            if let Some(existing) = self.attribute_keeper.get(&ident) {
                if existing.value_type() != value_type || existing.cardinality() != cardinality {
                    return Err(ComicdbError::load(format!(
                        "Attribute {} cannot be changed to ({}, {})",
                        existing, value_type, cardinality
                    )));
                }
                match &draft.origin {
                    EntityRef::Temp(tempid) => {
                        tempids.resolved.insert(tempid.clone(), existing.attribute());
                        self.thing_generator.release(entity);
                    }
                    EntityRef::Id(thing) if *thing != existing.attribute() => {
                        return Err(ComicdbError::load(format!(
                            "Attribute :{} already names entity {}",
                            ident,
                            existing.attribute()
                        )));
                    }
                    EntityRef::Id(_) => (),
                }
                continue;
            }
            if let Some(current) = self.attribute_keeper.ident(entity) {
                return Err(ComicdbError::load(format!(
                    "Entity {} is already :{} and cannot be renamed to :{}",
                    entity, current, ident
                )));
            }
            installed.push(Arc::new(Attribute::new(
                entity,
                ident,
                value_type,
                cardinality,
                draft.doc,
            )));
        }
        Ok(installed)
    }

    // every entity was resolved up front, so this cannot miss
    fn entity_of(&self, entity: &EntityRef, tempids: &Tempids) -> Thing {
        match entity {
            EntityRef::Id(thing) => *thing,
            EntityRef::Temp(tempid) => tempids.resolved[tempid],
        }
    }

    fn value_of(
        &self,
        assertion: &Assertion,
        attribute: &Attribute,
        tempids: &Tempids,
        index: usize,
    ) -> Result<Value> {
        if attribute.value_type() != ValueType::Ref {
            return Value::from_json(&assertion.value, attribute.value_type()).ok_or_else(|| {
                ComicdbError::load(format!(
                    "Value {} of assertion #{} does not fit {}",
                    assertion.value, index, attribute
                ))
            });
        }
        match &assertion.value {
            Json::String(tempid) => tempids
                .resolved
                .get(tempid)
                .map(|thing| Value::Ref(*thing))
                .ok_or_else(|| {
                    ComicdbError::load(format!(
                        "Unresolved tempid {:?} in assertion #{}",
                        tempid, index
                    ))
                }),
            Json::Number(n) => n
                .as_u64()
                .and_then(|thing| self.thing_generator.check(thing))
                .map(Value::Ref)
                .ok_or_else(|| {
                    ComicdbError::load(format!(
                        "Unknown entity {} referenced in assertion #{}",
                        n, index
                    ))
                }),
            other => Err(ComicdbError::load(format!(
                "Value {} of assertion #{} does not fit {}",
                other, index, attribute
            ))),
        }
    }
}
