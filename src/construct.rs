use std::sync::Arc;

// used to keep the one-to-one mapping between attribute idents and their things
use bimap::BiMap;

// keepers and lookups use HashSet or HashMap
use core::hash::{BuildHasher, BuildHasherDefault, Hasher};
use std::collections::hash_map::RandomState;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use seahash::SeaHasher;

// entity result sets
use roaring::RoaringTreemap;

// used to print out readable forms of a construct
use std::fmt;

// used to stamp the bootstrap transaction
use chrono::Utc;

use tracing::{debug, info};

// our own stuff that we need
use crate::datatype::{Cardinality, Value, ValueType};
use crate::error::{ComicdbError, Result};
pub use crate::persist::PersistenceMode;
use crate::persist::Persistor;
use crate::transact::PreparedTx;

// ------------- Thing -------------
pub type Thing = u64;

pub type ThingHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: Thing = 0;

#[derive(Debug)]
pub struct ThingGenerator {
    lower_bound: Thing,
    retained: HashSet<Thing, ThingHasher>,
    released: Vec<Thing>,
}

impl ThingGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
            retained: HashSet::<Thing, ThingHasher>::default(),
            released: Vec::new(),
        }
    }
    // Things may be explicitly referenced in a transaction, but only
    // implicitly created. Referencing a thing that was never generated
    // is an error, which is what check is for.
    pub fn check(&self, t: Thing) -> Option<Thing> {
        self.retained.get(&t).cloned()
    }
    pub fn release(&mut self, t: Thing) {
        if self.retained.remove(&t) {
            self.released.push(t);
        }
    }
    pub fn generate(&mut self) -> Thing {
        match self.released.pop() {
            Some(t) => {
                self.retained.insert(t);
                t
            }
            None => {
                self.lower_bound += 1;
                self.retained.insert(self.lower_bound);
                self.lower_bound
            }
        }
    }
    pub fn len(&self) -> usize {
        self.retained.len()
    }
}
impl Default for ThingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Attribute -------------
pub const DB_IDENT: &str = "db/ident";
pub const DB_VALUE_TYPE: &str = "db/valueType";
pub const DB_CARDINALITY: &str = "db/cardinality";
pub const DB_DOC: &str = "db/doc";
pub const DB_TX_INSTANT: &str = "db/txInstant";

// attributes every store starts out with
const BOOTSTRAP: [(&str, ValueType, &str); 5] = [
    (DB_IDENT, ValueType::Keyword, "Attribute used to uniquely name an entity."),
    (DB_VALUE_TYPE, ValueType::Keyword, "Attribute that specifies the value type of an attribute."),
    (DB_CARDINALITY, ValueType::Keyword, "Attribute that specifies whether an attribute has one or many values."),
    (DB_DOC, ValueType::String, "Documentation string for an entity."),
    (DB_TX_INSTANT, ValueType::Instant, "Attribute whose value is the instant a transaction was committed."),
];

#[derive(Eq, Debug)]
pub struct Attribute {
    attribute: Thing, // let it be a thing so the schema can be stored as datoms
    ident: String,
    value_type: ValueType,
    cardinality: Cardinality,
    doc: Option<String>,
}

impl Attribute {
    pub fn new(
        attribute: Thing,
        ident: String,
        value_type: ValueType,
        cardinality: Cardinality,
        doc: Option<String>,
    ) -> Self {
        Self {
            attribute,
            ident,
            value_type,
            cardinality,
            doc,
        }
    }
    pub fn attribute(&self) -> Thing {
        self.attribute
    }
    pub fn ident(&self) -> &str {
        &self.ident
    }
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
    pub fn reserved(&self) -> bool {
        self.ident.starts_with("db/")
    }
}
impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.ident == other.ident
    }
}
impl Hash for Attribute {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ident.hash(state);
    }
}
impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, ":{} ({}, {})", self.ident, self.value_type, self.cardinality)
    }
}

#[derive(Debug)]
pub struct AttributeKeeper {
    kept: HashMap<Thing, Arc<Attribute>, ThingHasher>,
    idents: BiMap<String, Thing>,
}
impl AttributeKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashMap::default(),
            idents: BiMap::new(),
        }
    }
    pub fn keep(&mut self, attribute: Arc<Attribute>) -> (Arc<Attribute>, bool) {
        if let Some(thing) = self.idents.get_by_left(attribute.ident()) {
            if let Some(kept) = self.kept.get(thing) {
                return (Arc::clone(kept), true);
            }
        }
        self.idents
            .insert(attribute.ident().to_string(), attribute.attribute());
        self.kept
            .insert(attribute.attribute(), Arc::clone(&attribute));
        (attribute, false)
    }
    pub fn get(&self, ident: &str) -> Option<Arc<Attribute>> {
        let thing = self.idents.get_by_left(ident)?;
        self.kept.get(thing).map(Arc::clone)
    }
    pub fn ident(&self, attribute: Thing) -> Option<&str> {
        self.idents.get_by_right(&attribute).map(String::as_str)
    }
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Attribute>> {
        self.kept.values()
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}
impl Default for AttributeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Datom -------------
#[derive(Eq, Debug)]
pub struct Datom {
    entity: Thing,
    attribute: Arc<Attribute>,
    value: Value,
    tx: Thing, // the transaction that asserted it, not part of the fact itself
}
impl Datom {
    pub fn new(entity: Thing, attribute: Arc<Attribute>, value: Value, tx: Thing) -> Self {
        Self {
            entity,
            attribute,
            value,
            tx,
        }
    }
    pub fn entity(&self) -> Thing {
        self.entity
    }
    pub fn attribute(&self) -> Arc<Attribute> {
        Arc::clone(&self.attribute)
    }
    pub fn value(&self) -> &Value {
        &self.value
    }
    pub fn tx(&self) -> Thing {
        self.tx
    }
}
impl PartialEq for Datom {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
            && self.attribute.attribute() == other.attribute.attribute()
            && self.value == other.value
    }
}
impl Hash for Datom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.hash(state);
        self.attribute.attribute().hash(state);
        self.value.hash(state);
    }
}
impl fmt::Display for Datom {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{} :{} {} {}]",
            self.entity,
            self.attribute.ident(),
            self.value,
            self.tx
        )
    }
}

#[derive(Debug)]
pub struct DatomKeeper {
    kept: HashSet<Arc<Datom>, OtherHasher>,
}
impl DatomKeeper {
    pub fn new() -> Self {
        Self {
            kept: HashSet::default(),
        }
    }
    pub fn keep(&mut self, datom: Datom) -> (Arc<Datom>, bool) {
        let keepsake = Arc::new(datom);
        match self.kept.get(&keepsake) {
            Some(kept) => (Arc::clone(kept), true),
            None => {
                self.kept.insert(Arc::clone(&keepsake));
                (keepsake, false)
            }
        }
    }
    pub fn forget(&mut self, datom: &Arc<Datom>) -> bool {
        self.kept.remove(datom)
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
}
impl Default for DatomKeeper {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Lookups -------------
#[derive(Debug)]
pub struct Lookup<K, V, H = RandomState> {
    index: HashMap<K, HashSet<V>, H>,
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, HashSet<V>, H>::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        self.index.entry(key).or_default().insert(value);
    }
    pub fn remove(&mut self, key: &K, value: &V) {
        if let Some(set) = self.index.get_mut(key) {
            set.remove(value);
            if set.is_empty() {
                self.index.remove(key);
            }
        }
    }
    pub fn lookup<'a>(&'a self, key: &K) -> impl Iterator<Item = &'a V> + use<'a, K, V, H> {
        self.index.get(key).into_iter().flatten()
    }
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Default for Lookup<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Database -------------
// This sets up the store with the necessary structures. It is owned by
// whoever created it and released through shutdown (or drop).
pub struct Database {
    // owns a thing generator
    pub(crate) thing_generator: ThingGenerator,
    // owns keepers for the available constructs
    pub(crate) attribute_keeper: AttributeKeeper,
    pub(crate) datom_keeper: DatomKeeper,
    // owns lookups between constructs (similar to database indexes)
    entity_to_datom_lookup: Lookup<Thing, Arc<Datom>, ThingHasher>,
    attribute_to_datom_lookup: Lookup<Thing, Arc<Datom>, ThingHasher>,
    reference_to_datom_lookup: Lookup<Thing, Arc<Datom>, ThingHasher>,
    // responsible for the optional file mirror
    pub(crate) persistor: Option<Persistor>,
}

impl Database {
    pub fn new(mode: PersistenceMode) -> Result<Database> {
        let persistor = match &mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::File(path) => Some(Persistor::open(path)?),
        };
        let mut database = Database {
            thing_generator: ThingGenerator::new(),
            attribute_keeper: AttributeKeeper::new(),
            datom_keeper: DatomKeeper::new(),
            entity_to_datom_lookup: Lookup::new(),
            attribute_to_datom_lookup: Lookup::new(),
            reference_to_datom_lookup: Lookup::new(),
            persistor,
        };
        database.bootstrap()?;
        info!(
            mode = ?mode,
            attributes = database.attribute_keeper.len(),
            "store opened"
        );
        Ok(database)
    }

    // The bootstrap attributes describe themselves, so they are all kept
    // before any of the datoms naming them are.
    fn bootstrap(&mut self) -> Result<()> {
        let mut installed = Vec::new();
        for (ident, value_type, doc) in BOOTSTRAP {
            let thing = self.thing_generator.generate();
            let attribute = Arc::new(Attribute::new(
                thing,
                ident.to_string(),
                value_type,
                Cardinality::One,
                Some(doc.to_string()),
            ));
            let (kept, _) = self.keep_attribute(attribute);
            installed.push(kept);
        }
        let tx = self.thing_generator.generate();
        let tx_instant = Utc::now();
        let mut datoms = Vec::new();
        for attribute in &installed {
            datoms.extend(self.describe(attribute, tx)?);
        }
        datoms.push(Datom::new(
            tx,
            self.resolve(DB_TX_INSTANT)?,
            Value::Instant(tx_instant),
            tx,
        ));
        self.commit(PreparedTx {
            tx,
            tx_instant,
            attributes: installed,
            retractions: Vec::new(),
            datoms,
        })?;
        Ok(())
    }

    // Applies a validated transaction, mirroring it first so that a failed
    // mirror write leaves the store untouched.
    pub(crate) fn commit(&mut self, prepared: PreparedTx) -> Result<usize> {
        if let Some(persistor) = self.persistor.as_mut() {
            persistor.persist_transaction(&prepared)?;
        }
        for attribute in prepared.attributes {
            self.keep_attribute(attribute);
        }
        for datom in &prepared.retractions {
            self.forget_datom(datom);
        }
        let mut added = 0;
        for datom in prepared.datoms {
            let (_, previously_kept) = self.keep_datom(datom);
            if !previously_kept {
                added += 1;
            }
        }
        Ok(added)
    }

    // the datoms currently asserting the attribute on the entity
    pub(crate) fn current(&self, entity: Thing, attribute: Thing) -> Vec<Arc<Datom>> {
        self.entity_to_datom_lookup
            .lookup(&entity)
            .filter(|datom| datom.attribute().attribute() == attribute)
            .map(Arc::clone)
            .collect()
    }

    // schema as data: the datoms that describe an installed attribute
    pub(crate) fn describe(&self, attribute: &Attribute, tx: Thing) -> Result<Vec<Datom>> {
        let mut datoms = vec![
            Datom::new(
                attribute.attribute(),
                self.resolve(DB_IDENT)?,
                Value::Keyword(attribute.ident().to_string()),
                tx,
            ),
            Datom::new(
                attribute.attribute(),
                self.resolve(DB_VALUE_TYPE)?,
                Value::Keyword(attribute.value_type().ident().to_string()),
                tx,
            ),
            Datom::new(
                attribute.attribute(),
                self.resolve(DB_CARDINALITY)?,
                Value::Keyword(attribute.cardinality().ident().to_string()),
                tx,
            ),
        ];
        if let Some(doc) = attribute.doc() {
            datoms.push(Datom::new(
                attribute.attribute(),
                self.resolve(DB_DOC)?,
                Value::String(doc.to_string()),
                tx,
            ));
        }
        Ok(datoms)
    }

    // functions to keep constructs that also populate the lookups
    pub(crate) fn keep_attribute(&mut self, attribute: Arc<Attribute>) -> (Arc<Attribute>, bool) {
        let (kept, previously_kept) = self.attribute_keeper.keep(attribute);
        if !previously_kept {
            info!(attribute = %kept, "attribute installed");
        }
        (kept, previously_kept)
    }
    pub(crate) fn keep_datom(&mut self, datom: Datom) -> (Arc<Datom>, bool) {
        let (kept, previously_kept) = self.datom_keeper.keep(datom);
        if !previously_kept {
            self.entity_to_datom_lookup
                .insert(kept.entity(), Arc::clone(&kept));
            self.attribute_to_datom_lookup
                .insert(kept.attribute().attribute(), Arc::clone(&kept));
            if let Value::Ref(target) = kept.value() {
                self.reference_to_datom_lookup
                    .insert(*target, Arc::clone(&kept));
            }
        }
        (kept, previously_kept)
    }
    pub(crate) fn forget_datom(&mut self, datom: &Arc<Datom>) {
        if self.datom_keeper.forget(datom) {
            debug!(datom = %datom, "datom retracted");
            self.entity_to_datom_lookup.remove(&datom.entity(), datom);
            self.attribute_to_datom_lookup
                .remove(&datom.attribute().attribute(), datom);
            if let Value::Ref(target) = datom.value() {
                self.reference_to_datom_lookup.remove(target, datom);
            }
        }
    }

    // functions to look things up
    pub fn attribute(&self, ident: &str) -> Option<Arc<Attribute>> {
        self.attribute_keeper.get(ident)
    }
    pub fn attributes(&self) -> impl Iterator<Item = &Arc<Attribute>> {
        self.attribute_keeper.iter()
    }
    pub(crate) fn resolve(&self, ident: &str) -> Result<Arc<Attribute>> {
        let ident = ident.strip_prefix(':').unwrap_or(ident);
        self.attribute_keeper
            .get(ident)
            .ok_or_else(|| ComicdbError::Query(format!("Unable to resolve attribute :{}", ident)))
    }
    /// Every entity that has at least one value for the attribute.
    pub fn entities_with(&self, ident: &str) -> Result<RoaringTreemap> {
        let attribute = self.resolve(ident)?;
        let mut result_set = RoaringTreemap::new();
        for datom in self.attribute_to_datom_lookup.lookup(&attribute.attribute()) {
            result_set.insert(datom.entity());
        }
        Ok(result_set)
    }
    /// The values of an attribute on an entity, in value order.
    pub fn values(&self, entity: Thing, ident: &str) -> Result<Vec<Value>> {
        let attribute = self.resolve(ident)?;
        let mut values: Vec<Value> = self
            .entity_to_datom_lookup
            .lookup(&entity)
            .filter(|datom| datom.attribute().attribute() == attribute.attribute())
            .map(|datom| datom.value().clone())
            .collect();
        values.sort();
        Ok(values)
    }
    pub fn value(&self, entity: Thing, ident: &str) -> Result<Option<Value>> {
        Ok(self.values(entity, ident)?.into_iter().next())
    }
    /// Every entity whose ref attribute points at the target.
    pub fn referencing(&self, ident: &str, target: Thing) -> Result<RoaringTreemap> {
        let attribute = self.resolve(ident)?;
        if attribute.value_type() != ValueType::Ref {
            return Err(ComicdbError::Query(format!(
                "Attribute :{} has value type {}, not {}",
                attribute.ident(),
                attribute.value_type(),
                ValueType::Ref
            )));
        }
        let mut result_set = RoaringTreemap::new();
        for datom in self.reference_to_datom_lookup.lookup(&target) {
            if datom.attribute().attribute() == attribute.attribute() {
                result_set.insert(datom.entity());
            }
        }
        Ok(result_set)
    }
    pub fn datoms(&self, entity: Thing) -> Vec<Arc<Datom>> {
        let mut datoms: Vec<Arc<Datom>> = self
            .entity_to_datom_lookup
            .lookup(&entity)
            .map(Arc::clone)
            .collect();
        datoms.sort_by(|a, b| {
            (a.attribute().ident(), a.value()).cmp(&(b.attribute().ident(), b.value()))
        });
        datoms
    }
    pub fn datom_count(&self) -> usize {
        self.datom_keeper.len()
    }
    pub fn thing_count(&self) -> usize {
        self.thing_generator.len()
    }

    /// Releases the store, closing the file mirror if there is one.
    pub fn shutdown(mut self) -> Result<()> {
        let datoms = self.datom_keeper.len();
        if let Some(persistor) = self.persistor.take() {
            persistor.close()?;
        }
        info!(datoms, "store shut down");
        Ok(())
    }
}
