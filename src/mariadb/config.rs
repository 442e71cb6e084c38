//! MariaDB configuration files
//!
//! The cluster ConfigMap carries `my.cnf` for every cluster and `galera.cnf`
//! when replication is enabled. Both are mounted into
//! `/etc/mysql/mariadb.conf.d`.

use kube::ResourceExt;

use crate::crd::MariaDB;

/// Directory the ConfigMap is mounted at
pub const CONFIG_DIR: &str = "/etc/mysql/mariadb.conf.d";
pub const MY_CNF_KEY: &str = "my.cnf";
pub const GALERA_CNF_KEY: &str = "galera.cnf";

pub const GALERA_REPLICATION_PORT: i32 = 4567;
pub const GALERA_IST_PORT: i32 = 4568;
pub const GALERA_SST_PORT: i32 = 4444;

/// wsrep provider library shipped in the official images
pub const WSREP_PROVIDER: &str = "/usr/lib/galera/libgalera_smm.so";

/// Generate `my.cnf`, appending the user supplied section verbatim
pub fn generate_my_cnf(mariadb: &MariaDB) -> String {
    let mut cnf = format!(
        "[mariadb]\n\
         bind-address=0.0.0.0\n\
         port={}\n\
         skip-name-resolve\n",
        mariadb.spec.port
    );
    if let Some(extra) = mariadb.spec.my_cnf.as_deref().filter(|s| !s.trim().is_empty()) {
        cnf.push('\n');
        cnf.push_str(extra.trim_end());
        cnf.push('\n');
    }
    cnf
}

/// Cluster address listing every member through the headless Service
pub fn cluster_address(mariadb: &MariaDB) -> String {
    let name = mariadb.name_any();
    let namespace = mariadb.namespace().unwrap_or_else(|| "default".to_string());
    let internal = mariadb.internal_service_name();
    let members: Vec<String> = (0..mariadb.spec.replicas.max(0))
        .map(|i| format!("{name}-{i}.{internal}.{namespace}.svc.cluster.local"))
        .collect();
    format!("gcomm://{}", members.join(","))
}

/// Generate `galera.cnf`, or None when replication is disabled
///
/// `wsrep_node_address` and `wsrep_node_name` are left to the entrypoint,
/// which knows the pod hostname.
pub fn generate_galera_cnf(mariadb: &MariaDB) -> Option<String> {
    let galera = mariadb.spec.galera.as_ref()?;
    Some(format!(
        "[mariadb]\n\
         binlog_format=row\n\
         default_storage_engine=InnoDB\n\
         innodb_autoinc_lock_mode=2\n\
         innodb_flush_log_at_trx_commit=0\n\
         \n\
         wsrep_on=ON\n\
         wsrep_provider={WSREP_PROVIDER}\n\
         wsrep_cluster_name={}\n\
         wsrep_cluster_address=\"{}\"\n\
         wsrep_provider_options=\"gmcast.listen_addr=tcp://0.0.0.0:{GALERA_REPLICATION_PORT};ist.recv_addr=0.0.0.0:{GALERA_IST_PORT}\"\n\
         wsrep_sst_method={}\n\
         wsrep_sst_receive_address=0.0.0.0:{GALERA_SST_PORT}\n",
        mariadb.name_any(),
        cluster_address(mariadb),
        galera.sst,
    ))
}
