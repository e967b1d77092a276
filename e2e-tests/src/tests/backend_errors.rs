use anyhow::{bail, ensure, Result};
use pgsink::{
    writer::{TableLister, WriteError, Writer, WriterSettings},
    CancellationToken,
};

use super::registry::{TestDefinition, TestModule};
use crate::{
    records::{people_message, users_message, Person},
    test_suite::TestContext,
};

pub struct BackendErrorTests;

impl TestModule for BackendErrorTests {
    fn get_tests() -> Vec<TestDefinition> {
        vec![
            TestDefinition::new(
                "test_unique_violation_is_structured",
                "A rejected batch reports the backend diagnostics and commits nothing",
                unique_violation_test,
            ),
            TestDefinition::new(
                "test_extra_record_column",
                "A record column the table does not have fails before anything is written",
                extra_column_test,
            ),
            TestDefinition::new(
                "test_stopped_database_is_transport",
                "Losing the database mid-run surfaces as a transport failure",
                stopped_database_test,
            )
            .with_timeout(120),
        ]
    }
}

fn unique_violation_test(
    context: &mut TestContext,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + '_>> {
    Box::pin(async move {
        context
            .execute("create table people (id int, name text unique, age int, _row_id uuid)")
            .await?;

        let message = people_message(
            "people",
            &[
                Person { id: 1, name: "John", age: 20, row_id: [1; 16] },
                Person { id: 2, name: "John", age: 21, row_id: [2; 16] },
            ],
        )?;

        let mut writer = context.writer("test", 10).await?;
        let err = match writer.write(&[message], &CancellationToken::new()).await {
            Ok(summary) => bail!("expected a unique violation, wrote {} rows", summary.rows),
            Err(err) => err,
        };

        match &err {
            WriteError::StructuredBackend { table, statement, detail, .. } => {
                ensure!(detail.code == "23505", "unexpected code {}", detail.code);
                ensure!(
                    detail.constraint_name.as_deref() == Some("people_name_key"),
                    "unexpected constraint {:?}",
                    detail.constraint_name
                );
                ensure!(table.as_deref() == Some("people"), "unexpected table {:?}", table);
                ensure!(
                    statement
                        .as_deref()
                        .is_some_and(|sql| sql.starts_with("insert into \"people\"")),
                    "unexpected statement {:?}",
                    statement
                );
            }
            other => bail!("expected a structured backend error, got {}", other),
        }
        ensure!(err.to_string().contains("constraint_name: people_name_key"));

        let count: i64 = context.client.query("select count(*) from people", &[]).await?[0].get(0);
        ensure!(count == 0, "expected the failed batch to roll back, found {} rows", count);

        Ok(())
    })
}

fn extra_column_test(
    context: &mut TestContext,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + '_>> {
    Box::pin(async move {
        context.execute("create table narrow (id int, _row_id uuid)").await?;

        let message = users_message("narrow", &[(1, "John", [1; 16])])?;
        let mut writer = context.writer("test", 10).await?;

        match writer.write(&[message], &CancellationToken::new()).await {
            Err(WriteError::SchemaMismatch(_)) => {}
            Err(other) => bail!("expected a schema mismatch, got {}", other),
            Ok(summary) => bail!("expected a schema mismatch, wrote {} rows", summary.rows),
        }

        let count: i64 = context.client.query("select count(*) from narrow", &[]).await?[0].get(0);
        ensure!(count == 0, "expected nothing written, found {} rows", count);

        Ok(())
    })
}

fn stopped_database_test(
    context: &mut TestContext,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + '_>> {
    Box::pin(async move {
        context.execute("create table users (id int primary key, name text, _row_id uuid)").await?;

        let client = pgsink::PostgresClient::new(&context.database_url, true, None).await?;
        let tables = client.list_tables().await?;
        let mut writer = Writer::with_tables(
            client,
            WriterSettings { batch_size: 10, identity_salt: "test".to_string() },
            tables,
        );

        context.stop_database().await?;

        let message = users_message("users", &[(1, "John", [1; 16])])?;
        match writer.write(&[message], &CancellationToken::new()).await {
            Err(WriteError::Transport { .. }) => Ok(()),
            Err(other) => bail!("expected a transport failure, got {}", other),
            Ok(summary) => bail!("expected a transport failure, wrote {} rows", summary.rows),
        }
    })
}
