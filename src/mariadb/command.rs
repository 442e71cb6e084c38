//! Shell commands run by SqlJob pods

use kube::ResourceExt;

use crate::crd::MariaDB;

/// Environment variables holding client credentials inside Job pods
pub const USER_ENV: &str = "MARIADB_USER";
pub const PASSWORD_ENV: &str = "MARIADB_PASSWORD";

/// A container command and its arguments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub command: Vec<String>,
    pub args: Vec<String>,
}

impl Command {
    /// Run `steps` in order through `bash -c`
    pub fn exec<S: AsRef<str>>(steps: &[S]) -> Self {
        let script = steps
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(";");
        Self {
            command: vec!["bash".to_string(), "-c".to_string()],
            args: vec![script],
        }
    }
}

/// Which credentials and database a client connects with
#[derive(Clone, Debug)]
pub struct ConnectionOpts<'a> {
    pub user_env: &'a str,
    pub password_env: &'a str,
    pub database: Option<&'a str>,
}

impl Default for ConnectionOpts<'_> {
    fn default() -> Self {
        Self {
            user_env: USER_ENV,
            password_env: PASSWORD_ENV,
            database: None,
        }
    }
}

/// In-cluster DNS name of the client Service
pub fn host(mariadb: &MariaDB) -> String {
    format!(
        "{}.{}.svc.cluster.local",
        mariadb.service_name(),
        mariadb.namespace().unwrap_or_else(|| "default".to_string())
    )
}

/// `mariadb` client flags. Credentials are expanded by the shell from env.
pub fn connection_flags(opts: &ConnectionOpts<'_>, mariadb: &MariaDB) -> String {
    let mut flags = format!(
        "--user=${{{}}} --password=${{{}}} --host={} --port={}",
        opts.user_env,
        opts.password_env,
        host(mariadb),
        mariadb.spec.port
    );
    if let Some(database) = opts.database {
        flags.push_str(&format!(" --database={database}"));
    }
    flags
}

/// Command executing the SQL in `sql_file` with the `mariadb` client
pub fn execute_sql_file(opts: &ConnectionOpts<'_>, mariadb: &MariaDB, sql_file: &str) -> Command {
    Command::exec(&[
        "echo 'Executing SQL script'".to_string(),
        format!("mariadb {} < {}", connection_flags(opts, mariadb), sql_file),
    ])
}

/// Command executing the SQL held in environment variable `sql_env`
pub fn execute_sql_env(opts: &ConnectionOpts<'_>, mariadb: &MariaDB, sql_env: &str) -> Command {
    Command::exec(&[
        "echo 'Executing SQL script'".to_string(),
        format!(
            "printf '%s' \"${{{}}}\" | mariadb {}",
            sql_env,
            connection_flags(opts, mariadb)
        ),
    ])
}
