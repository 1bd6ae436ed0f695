//! `Endpoint` persistence and the channel credential columns it seeds.

use uuid::Uuid;

use svcchan_types::ids::{ChannelId, EndpointId, TemplateId};
use svcchan_types::model::{Blob, Endpoint, EndpointStatus, Hash32};

use crate::error::StoreError;
use crate::Store;

impl Store {
    /// Loads an endpoint by primary key.
    pub async fn get_endpoint(&self, id: EndpointId) -> Result<Option<Endpoint>, StoreError> {
        let row = sqlx::query_as::<_, EndpointRow>(
            "SELECT id, channel, template, hash, raw, status FROM endpoint WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await?;
        row.map(EndpointRow::into_endpoint).transpose()
    }

    /// Inserts a newly sealed endpoint message, `status = unpublished`.
    pub async fn insert_endpoint(
        &self,
        channel: ChannelId,
        template: TemplateId,
        hash: Hash32,
        raw: &Blob,
    ) -> Result<EndpointId, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO endpoint (id, channel, template, hash, raw, status) \
             VALUES ($1, $2, $3, $4, $5, 'unpublished')",
        )
        .bind(id)
        .bind(channel.as_uuid())
        .bind(template.as_uuid())
        .bind(hash.0.as_slice())
        .bind(raw.0.as_slice())
        .execute(self.pool())
        .await?;
        Ok(EndpointId(id))
    }

    /// Advances an endpoint's publication status.
    pub async fn update_endpoint_status(&self, id: EndpointId, status: EndpointStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE endpoint SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(endpoint_status_str(status))
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Seeds the channel's access-credential columns.
    pub async fn set_channel_credentials(
        &self,
        channel: ChannelId,
        username: &str,
        password_hash: &Blob,
        password_salt: &Blob,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE channel SET username = $2, password_hash = $3, password_salt = $4 WHERE id = $1",
        )
        .bind(channel.as_uuid())
        .bind(username)
        .bind(password_hash.0.as_slice())
        .bind(password_salt.0.as_slice())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

fn endpoint_status_str(status: EndpointStatus) -> &'static str {
    match status {
        EndpointStatus::Unpublished => "unpublished",
        EndpointStatus::BchainPublished => "bchain_published",
        EndpointStatus::MsgChannelPublished => "msg_channel_published",
    }
}

fn parse_endpoint_status(s: &str) -> EndpointStatus {
    match s {
        "bchain_published" => EndpointStatus::BchainPublished,
        "msg_channel_published" => EndpointStatus::MsgChannelPublished,
        _ => EndpointStatus::Unpublished,
    }
}

#[derive(sqlx::FromRow)]
struct EndpointRow {
    id: Uuid,
    channel: Uuid,
    template: Uuid,
    hash: Vec<u8>,
    raw: Vec<u8>,
    status: String,
}

impl EndpointRow {
    fn into_endpoint(self) -> Result<Endpoint, StoreError> {
        Ok(Endpoint {
            id: self.id.into(),
            channel: self.channel.into(),
            template: self.template.into(),
            hash: Hash32::from_slice(&self.hash)
                .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?,
            raw: Blob(self.raw),
            status: parse_endpoint_status(&self.status),
        })
    }
}
