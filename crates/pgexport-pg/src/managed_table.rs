use pgexport_types::{Destination, ExportError, ManagedTableDescriptor};

/// Scoped table acquisition (spec §4.4). Construct with `acquire`, do work
/// against `descriptor()`, then always call `release` — on every exit path,
/// success or failure — so `delete_on_exit` tables are dropped
/// deterministically rather than relying on a finalizer.
pub struct ManagedTable {
    descriptor: ManagedTableDescriptor,
}

impl ManagedTable {
    pub async fn acquire<D: Destination + ?Sized>(
        client: &D,
        descriptor: ManagedTableDescriptor,
    ) -> Result<Self, ExportError> {
        if descriptor.create {
            client
                .create_table(
                    &descriptor.schema,
                    &descriptor.table,
                    &descriptor.fields,
                    true,
                    descriptor.primary_key.as_deref(),
                )
                .await?;
        }
        Ok(Self { descriptor })
    }

    pub fn descriptor(&self) -> &ManagedTableDescriptor {
        &self.descriptor
    }

    /// Drops the table if `delete_on_exit` was set. Must be called on every
    /// exit path (success or error) by the caller; the body never observes
    /// a partially created table because `acquire`'s create runs fully
    /// before it returns.
    pub async fn release<D: Destination + ?Sized>(self, client: &D) -> Result<(), ExportError> {
        if self.descriptor.delete_on_exit {
            client
                .drop_table(&self.descriptor.schema, &self.descriptor.table, true)
                .await?;
        }
        Ok(())
    }
}
