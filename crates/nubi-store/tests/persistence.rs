//! State survives daemon restarts: every collection round-trips through
//! its JSON file, and damaged files degrade to an empty start instead of
//! refusing to boot.

use chrono::Utc;
use tempfile::TempDir;

use nubi_model::{
    Backend, CertProvenance, Certificate, DefaultRoute, DefaultRouteMode, HostSpec, LbMethod,
    MaintenanceBackup, TagSpec,
};
use nubi_store::StateStore;

fn certificate(id: &str) -> Certificate {
    let now = Utc::now();
    Certificate {
        id: id.into(),
        name: "wild".into(),
        domains: vec!["*.example.com".into()],
        cert_path: format!("/var/lib/nubi/certs/{id}.crt"),
        key_path: format!("/var/lib/nubi/certs/{id}.key"),
        chain_path: None,
        provenance: CertProvenance::AcmeIssued,
        expires_at: now + chrono::Duration::days(60),
        auto_renew: true,
        tags: vec![],
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn full_state_round_trips_across_restart() {
    let dir = TempDir::new().unwrap();

    let original_host;
    let original_tag;
    {
        let store = StateStore::load(dir.path());

        store.insert_certificate(certificate("c1")).unwrap();

        original_tag = store
            .create_tag(TagSpec {
                name: "production".into(),
                color: "#22c55e".into(),
            })
            .unwrap();

        let host = store
            .prepare_create_host(HostSpec {
                domain: "lb.example.com".into(),
                backends: vec![
                    Backend {
                        address: "10.0.0.1:80".into(),
                        weight: 3,
                        backup: false,
                    },
                    Backend {
                        address: "10.0.0.2:80".into(),
                        weight: 1,
                        backup: true,
                    },
                ],
                lb_method: LbMethod::LeastConn,
                ssl: true,
                certificate_id: Some("c1".into()),
                enabled: true,
                tags: vec![original_tag.id.clone()],
                ..Default::default()
            })
            .unwrap();
        store.commit_host(host.clone()).unwrap();
        original_host = host;

        store
            .commit_default_route(DefaultRoute {
                enabled: true,
                mode: DefaultRouteMode::ErrorCode,
                error_code: 444,
                ..Default::default()
            })
            .unwrap();

        store
            .set_maintenance_backup(Some(MaintenanceBackup {
                message: "upgrading".into(),
                previous: None,
            }))
            .unwrap();
    }

    let reloaded = StateStore::load(dir.path());

    let hosts = reloaded.list_hosts();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0], original_host);
    // Backend order is significant and must survive the round trip.
    assert_eq!(hosts[0].backends[0].address, "10.0.0.1:80");
    assert_eq!(hosts[0].backends[1].address, "10.0.0.2:80");

    assert_eq!(reloaded.get_certificate("c1").unwrap().id, "c1");
    assert_eq!(reloaded.get_tag(&original_tag.id).unwrap().name, "production");
    assert_eq!(reloaded.default_route().error_code, 444);
    assert_eq!(reloaded.maintenance_backup().unwrap().message, "upgrading");
}

#[test]
fn each_collection_lives_in_its_own_file() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::load(dir.path());

    store.insert_certificate(certificate("c1")).unwrap();
    store
        .create_tag(TagSpec {
            name: "t".into(),
            color: String::new(),
        })
        .unwrap();
    let host = store
        .prepare_create_host(HostSpec {
            domain: "a.example.com".into(),
            target: "http://127.0.0.1:1".into(),
            ..Default::default()
        })
        .unwrap();
    store.commit_host(host).unwrap();
    store.commit_default_route(DefaultRoute::default()).unwrap();

    for file in [
        "proxy_hosts.json",
        "certificates.json",
        "tags.json",
        "default_route_state.json",
    ] {
        assert!(dir.path().join(file).exists(), "missing {file}");
    }
}

#[test]
fn one_damaged_file_does_not_poison_the_rest() {
    let dir = TempDir::new().unwrap();
    {
        let store = StateStore::load(dir.path());
        store.insert_certificate(certificate("c1")).unwrap();
        let host = store
            .prepare_create_host(HostSpec {
                domain: "a.example.com".into(),
                target: "http://127.0.0.1:1".into(),
                ..Default::default()
            })
            .unwrap();
        store.commit_host(host).unwrap();
    }

    // Truncate the hosts file mid-array.
    std::fs::write(dir.path().join("proxy_hosts.json"), "[{\"id\": \"trunc").unwrap();

    let reloaded = StateStore::load(dir.path());
    assert!(reloaded.list_hosts().is_empty());
    assert_eq!(reloaded.list_certificates().len(), 1);
}
