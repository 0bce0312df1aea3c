// used for persistence
use rusqlite::{params, Connection};

use crate::error::{ComicdbError, Result};
use crate::transact::PreparedTx;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PersistenceMode {
    #[default]
    InMemory,
    File(String),
}

// ------------- Persistence -------------
// Mirrors committed transactions into SQLite so that a loaded store can be
// inspected with external tools. The mirror is write-only and starts out
// empty on every open.
pub struct Persistor {
    connection: Connection,
}
impl Persistor {
    pub fn open(path: &str) -> Result<Persistor> {
        let connection = Connection::open(path).map_err(|e| {
            ComicdbError::StoreInit(format!("Could not open '{}': {}", path, e))
        })?;
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection
            .execute_batch(
                "
            drop table if exists Datom;
            drop table if exists Tx;
            drop table if exists Attribute;
            create table Attribute (
                Attribute_Identity integer not null,
                Ident text not null,
                ValueType text not null,
                Cardinality text not null,
                Doc text null,
                constraint referenceable_Attribute_Identity primary key (
                    Attribute_Identity
                ),
                constraint unique_Ident unique (
                    Ident
                )
            );-- STRICT;
            create table Tx (
                Tx_Identity integer not null,
                TxInstant text not null,
                constraint referenceable_Tx_Identity primary key (
                    Tx_Identity
                )
            );-- STRICT;
            create table Datom (
                Entity_Identity integer not null,
                Attribute_Identity integer not null,
                Value any null,
                Tx_Identity integer not null,
                constraint Datom_has_Attribute foreign key (
                    Attribute_Identity
                ) references Attribute(Attribute_Identity),
                constraint Datom_in_Tx foreign key (
                    Tx_Identity
                ) references Tx(Tx_Identity),
                constraint unique_Datom unique (
                    Entity_Identity,
                    Attribute_Identity,
                    Value
                )
            );-- STRICT;
            ",
            )
            .map_err(|e| {
                ComicdbError::StoreInit(format!("Could not set up '{}': {}", path, e))
            })?;
        Ok(Persistor { connection })
    }
    pub(crate) fn persist_transaction(&mut self, prepared: &PreparedTx) -> Result<()> {
        let transaction = self.connection.transaction()?;
        {
            let mut add_tx = transaction.prepare_cached(
                "
                insert into Tx (
                    Tx_Identity,
                    TxInstant
                ) values (?1, ?2)
            ",
            )?;
            add_tx.execute(params![prepared.tx as i64, prepared.tx_instant])?;

            let mut add_attribute = transaction.prepare_cached(
                "
                insert or ignore into Attribute (
                    Attribute_Identity,
                    Ident,
                    ValueType,
                    Cardinality,
                    Doc
                ) values (?1, ?2, ?3, ?4, ?5)
            ",
            )?;
            for attribute in &prepared.attributes {
                add_attribute.execute(params![
                    attribute.attribute() as i64,
                    attribute.ident(),
                    attribute.value_type().ident(),
                    attribute.cardinality().ident(),
                    attribute.doc()
                ])?;
            }

            let mut retract_datom = transaction.prepare_cached(
                "
                delete from Datom
                    where Entity_Identity = ?1
                    and Attribute_Identity = ?2
                    and Value = ?3
            ",
            )?;
            for datom in &prepared.retractions {
                retract_datom.execute(params![
                    datom.entity() as i64,
                    datom.attribute().attribute() as i64,
                    datom.value()
                ])?;
            }

            let mut add_datom = transaction.prepare_cached(
                "
                insert or ignore into Datom (
                    Entity_Identity,
                    Attribute_Identity,
                    Value,
                    Tx_Identity
                ) values (?1, ?2, ?3, ?4)
            ",
            )?;
            for datom in &prepared.datoms {
                add_datom.execute(params![
                    datom.entity() as i64,
                    datom.attribute().attribute() as i64,
                    datom.value(),
                    datom.tx() as i64
                ])?;
            }
        }
        transaction.commit()?;
        Ok(())
    }
    pub fn close(self) -> Result<()> {
        self.connection
            .close()
            .map_err(|(_, e)| ComicdbError::from(e))
    }
}
