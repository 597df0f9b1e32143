//! [`DbConnector`] backed by the `mysql` CLI client talking to a local
//! MariaDB instance over a UNIX socket.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::collaborators::run;
use crate::error::{Error, Result};
use crate::ports::{DbConnector, GtidMode, ReplicationStatus};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Issues SQL to the local database through the `mysql` client. Every
/// method is a single `mysql -NBe '<statement>'` invocation.
pub struct MariadbConnector {
    port: u16,
}

impl MariadbConnector {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    async fn query(&self, statement: &str) -> Result<String> {
        let port = self.port.to_string();
        run(
            "mysql",
            &["-NB", "-P", &port, "-e", statement],
            COMMAND_TIMEOUT,
            Error::Db,
        )
        .await
    }
}

impl DbConnector for MariadbConnector {
    async fn is_read_only(&mut self) -> Result<bool> {
        let output = self.query("SELECT @@read_only").await?;
        Ok(output.trim() == "1")
    }

    async fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        let value = if read_only { 1 } else { 0 };
        self.query(&format!("SET GLOBAL read_only = {value}")).await?;
        Ok(())
    }

    async fn start_replica(&mut self) -> Result<()> {
        self.query("START REPLICA").await?;
        Ok(())
    }

    async fn stop_replica(&mut self) -> Result<()> {
        self.query("STOP REPLICA").await?;
        Ok(())
    }

    async fn reset_all_replicas(&mut self) -> Result<()> {
        self.query("RESET REPLICA ALL").await?;
        Ok(())
    }

    async fn change_master_to(
        &mut self,
        host: Ipv4Addr,
        port: u16,
        user: &str,
        password: &str,
        gtid_mode: GtidMode,
    ) -> Result<()> {
        let statement = format!(
            "CHANGE MASTER TO master_host='{host}', master_port={port}, \
             master_user='{user}', master_password='{password}', \
             master_use_gtid={}",
            gtid_mode.as_sql()
        );
        self.query(&statement).await?;
        Ok(())
    }

    async fn show_replication_status(&mut self) -> Result<ReplicationStatus> {
        let output = self.query("SHOW REPLICA STATUS\\G").await?;
        Ok(parse_show_replica_status(&output))
    }

    async fn create_database(&mut self, name: &str) -> Result<()> {
        self.query(&format!("CREATE DATABASE IF NOT EXISTS {name}")).await?;
        Ok(())
    }

    async fn create_id_table(&mut self, database: &str, table: &str) -> Result<()> {
        self.query(&format!(
            "CREATE TABLE IF NOT EXISTS {database}.{table}(id INT)"
        ))
        .await?;
        Ok(())
    }

    async fn insert_id(&mut self, database: &str, table: &str, id: i64) -> Result<()> {
        self.query(&format!("INSERT INTO {database}.{table} VALUES({id})")).await?;
        Ok(())
    }

    async fn delete_all(&mut self, database: &str, table: &str) -> Result<()> {
        self.query(&format!("DELETE FROM {database}.{table}")).await?;
        Ok(())
    }

    async fn remove_master_info(&mut self) -> Result<()> {
        remove_if_exists("master.info")
    }

    async fn remove_relay_info(&mut self) -> Result<()> {
        remove_if_exists("relay-log.info")
    }
}

fn remove_if_exists(path: &str) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(Error::Io(error)),
    }
}

/// Parses `SHOW REPLICA STATUS\G`'s `Key: Value` lines into a mapping.
fn parse_show_replica_status(output: &str) -> ReplicationStatus {
    let mut status = ReplicationStatus::new();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        status.insert(key.trim().to_string(), value.trim().to_string());
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vertical_replica_status_output() {
        let raw = "*************************** 1. row ***************************\n\
                    Slave_IO_Running: Yes\n\
                    Slave_SQL_Running: Yes\n\
                    Master_Log_File: binlog.000003\n\
                    Read_Master_Log_Pos: 500\n";
        let status = parse_show_replica_status(raw);
        assert_eq!(status.get("Slave_IO_Running").map(String::as_str), Some("Yes"));
        assert_eq!(status.get("Read_Master_Log_Pos").map(String::as_str), Some("500"));
    }

    #[test]
    fn removing_an_absent_file_succeeds() {
        assert!(remove_if_exists("/tmp/kimberlite-cluster-definitely-absent-info").is_ok());
    }
}
