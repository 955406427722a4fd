//! Amazon Redshift Data API implementation of [`StatementApi`].

use super::{Addressing, ResultPage, StatementApi, StatementDescription, StatementStatus};
use crate::config::WarehouseConfig;
use crate::db::{ColumnInfo, Row, Value};
use crate::error::{Result, SageError};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_redshiftdata::error::DisplayErrorContext;
use aws_sdk_redshiftdata::types::Field;
use aws_sdk_redshiftdata::Client;

/// Redshift Data API client.
///
/// Credentials come from the standard AWS provider chain (environment,
/// profile, instance role).
#[derive(Debug, Clone)]
pub struct RedshiftDataApi {
    client: Client,
}

impl RedshiftDataApi {
    /// Builds a client for the configured region.
    pub async fn from_config(config: &WarehouseConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn api_error<E>(action: &str, error: E) -> SageError
where
    E: std::error::Error,
{
    SageError::query(format!("{action} failed: {}", DisplayErrorContext(error)))
}

#[async_trait]
impl StatementApi for RedshiftDataApi {
    async fn submit(&self, database: &str, sql: &str, addressing: &Addressing) -> Result<String> {
        let request = self.client.execute_statement().database(database).sql(sql);
        let request = match addressing {
            Addressing::Serverless { workgroup_name } => request.workgroup_name(workgroup_name),
            Addressing::Provisioned {
                cluster_identifier,
                db_user,
            } => request
                .cluster_identifier(cluster_identifier)
                .db_user(db_user),
        };

        let output = request
            .send()
            .await
            .map_err(|e| api_error("ExecuteStatement", e))?;

        output
            .id()
            .map(String::from)
            .ok_or_else(|| SageError::query("ExecuteStatement returned no statement id"))
    }

    async fn describe(&self, statement_id: &str) -> Result<StatementDescription> {
        let output = self
            .client
            .describe_statement()
            .id(statement_id)
            .send()
            .await
            .map_err(|e| api_error("DescribeStatement", e))?;

        let status = output
            .status()
            .map(|s| StatementStatus::parse(s.as_str()))
            .unwrap_or(StatementStatus::Submitted);

        Ok(StatementDescription {
            status,
            error: output.error().map(String::from),
            // Absent while the statement is still running
            has_result_set: output.has_result_set().unwrap_or(true),
        })
    }

    async fn fetch_page(
        &self,
        statement_id: &str,
        next_token: Option<String>,
    ) -> Result<ResultPage> {
        let output = self
            .client
            .get_statement_result()
            .id(statement_id)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| api_error("GetStatementResult", e))?;

        let columns = output
            .column_metadata()
            .iter()
            .map(|meta| {
                ColumnInfo::new(
                    meta.name().unwrap_or_default(),
                    meta.type_name().unwrap_or_default(),
                )
            })
            .collect();

        let rows = output
            .records()
            .iter()
            .map(|record| record.iter().map(convert_field).collect::<Row>())
            .collect();

        Ok(ResultPage {
            columns,
            rows,
            total_rows: usize::try_from(output.total_num_rows()).ok(),
            next_token: output
                .next_token()
                .filter(|token| !token.is_empty())
                .map(String::from),
        })
    }

    async fn cancel(&self, statement_id: &str) -> Result<()> {
        self.client
            .cancel_statement()
            .id(statement_id)
            .send()
            .await
            .map_err(|e| api_error("CancelStatement", e))?;
        Ok(())
    }
}

/// Converts a Data API field into a value, keeping its native type.
fn convert_field(field: &Field) -> Value {
    match field {
        Field::IsNull(true) => Value::Null,
        Field::StringValue(s) => Value::String(s.clone()),
        Field::LongValue(v) => Value::Int(*v),
        Field::DoubleValue(v) => Value::Float(*v),
        Field::BooleanValue(v) => Value::Bool(*v),
        Field::BlobValue(blob) => Value::Bytes(blob.as_ref().to_vec()),
        _ => Value::Null,
    }
}
