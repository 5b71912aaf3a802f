//! End-to-end exercises of the harness against a scripted DHT engine.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::Ordering;

use bytes::Bytes;

use seedwatch::announce::{AddResult, Lifetime};
use seedwatch::kad::{AddressFamily, DhtEngine, DhtEvent};
use seedwatch::reactor::Reactor;
use seedwatch::{date_tag, setup, Config, Harness, Id, Node, Result};

#[derive(Default)]
struct ScriptedDht {
    events: VecDeque<DhtEvent>,
    searches: Vec<(Id, u16, AddressFamily)>,
    announces: Vec<(Id, u16)>,
    more: Vec<(Id, SocketAddr)>,
    nodes: usize,
    drives: usize,
}

impl DhtEngine for ScriptedDht {
    fn drive(&mut self, _now: u64, _readable: bool) {
        self.drives += 1;
    }

    fn poll_event(&mut self) -> Option<DhtEvent> {
        self.events.pop_front()
    }

    fn start_search(&mut self, target: Id, port: u16, family: AddressFamily) -> Result<()> {
        self.searches.push((target, port, family));
        Ok(())
    }

    fn announce(&mut self, target: Id, port: u16) -> Result<()> {
        self.announces.push((target, port));
        Ok(())
    }

    fn request_more(&mut self, target: Id, responder: &Node) -> Result<()> {
        self.more.push((target, responder.address));
        Ok(())
    }

    fn count_nodes(&self, _family: AddressFamily) -> usize {
        self.nodes
    }
}

fn test_config(dir: &Path) -> Config {
    Config {
        result_log_dir: dir.to_path_buf(),
        responder_log_dir: dir.to_path_buf(),
        port_map_path: dir.join("port_map"),
        ..Config::default()
    }
}

fn compact(last: u8, port: u16) -> [u8; 6] {
    let p = port.to_be_bytes();
    [10, 0, 0, last, p[0], p[1]]
}

#[test]
fn crawl_runs_to_convergence_and_logs_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(&test_config(dir.path()), ScriptedDht::default());
    let now = 1_704_067_200u64;
    let tag = date_tag(now);

    let id = harness
        .lookup("payload.bin-2024-01-01", "payload.bin", &tag, now)
        .unwrap()
        .unwrap();
    assert_eq!(harness.dht.searches, vec![(id, 0, AddressFamily::V4)]);

    let responder = Node::new(Id::random(), SocketAddr::from(([9, 9, 9, 9], 6881)));
    harness.dht.events.push_back(DhtEvent::Values {
        target: id,
        from: responder.clone(),
        family: AddressFamily::V4,
        data: Bytes::from([compact(1, 6881), compact(2, 51413)].concat()),
    });
    harness.dht.events.push_back(DhtEvent::SearchDone {
        target: id,
        from: responder.clone(),
        family: AddressFamily::V4,
    });

    // Drain the scripted events the way the run loop would.
    while let Some(event) = harness.dht.poll_event() {
        harness
            .crawler
            .on_event(event, &mut harness.results, &mut harness.dht, now + 1);
    }

    assert!(harness.results.is_empty(), "converged crawl is removed");

    let log = std::fs::read_to_string(dir.path().join(format!("{}.log", date_tag(now + 1)))).unwrap();
    assert!(log.contains(&format!(
        "{} payload.bin {} {} seeder 10.0.0.1 6881",
        now + 1,
        tag,
        id
    )));
    assert!(log.contains("seeder 10.0.0.2 51413"));

    let responders =
        std::fs::read_to_string(dir.path().join(format!("responders_{}.log", date_tag(now + 1))))
            .unwrap();
    assert!(responders.contains(&format!("#{} {} {}", now + 1, id, responder.id)));
}

#[test]
fn ingested_identifiers_are_announced_on_rotating_ranges() {
    let dir = tempfile::tempdir().unwrap();
    let now = 1_704_067_200u64;
    let tag = date_tag(now);

    let ingest = dir.path().join("ingest");
    std::fs::write(
        &ingest,
        format!("payload-one one.bin {t}\npayload-two two.bin {t}\n", t = tag),
    )
    .unwrap();

    let config = Config {
        ingest_path: Some(ingest),
        ..test_config(dir.path())
    };
    let mut harness = Harness::new(&config, ScriptedDht::default());
    harness.dht.nodes = 8;

    harness
        .announces
        .on_tick(now, &mut harness.dht)
        .unwrap();

    // Two entries, consecutive base ports, full range each.
    assert_eq!(harness.announces.len(), 2);
    assert_eq!(harness.dht.announces.len(), 2 * config.ports_per_announce as usize);

    let one = Id::from_query("payload-one");
    let ports: Vec<u16> = harness
        .dht
        .announces
        .iter()
        .filter(|(id, _)| *id == one)
        .map(|(_, port)| *port)
        .collect();
    let base = harness.announces.find(&one).unwrap().base_port;
    assert_eq!(
        ports,
        (base..base + config.ports_per_announce).collect::<Vec<u16>>()
    );

    let map = std::fs::read_to_string(dir.path().join("port_map")).unwrap();
    assert!(map.contains(&format!("{} {} one.bin {}", base, one, tag)));
}

#[test]
fn direct_announce_assigns_the_band_floor_first() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut harness = Harness::new(&config, ScriptedDht::default());

    let result = harness
        .announce("payload-one", Lifetime::Never, "one.bin", "2024-01-01", 100)
        .unwrap();

    assert_eq!(result, AddResult::Created(config.min_port));
}

#[test]
fn run_loop_dispatches_all_three_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let mut harness = Harness::new(&test_config(dir.path()), ScriptedDht::default());

    let mut reactor: Reactor<Harness<ScriptedDht>> = Reactor::new().unwrap();
    setup(&mut reactor, None).unwrap();
    assert_eq!(reactor.len(), 3);

    // Stop after the first full iteration.
    let running = reactor.running_flag();
    reactor
        .register(
            None,
            Box::new(move |_: &mut Harness<ScriptedDht>, _, _| {
                running.store(false, Ordering::SeqCst);
            }),
        )
        .unwrap();

    reactor.run(&mut harness).unwrap();

    assert_eq!(harness.dht.drives, 1);
}

#[test]
fn corrupt_port_map_stops_the_run_loop() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        ingest_path: Some(dir.path().join("ingest")),
        ..test_config(dir.path())
    };
    std::fs::write(&config.port_map_path, "not a record\n").unwrap();
    std::fs::write(
        dir.path().join("ingest"),
        "payload-one one.bin 2024-01-01\n",
    )
    .unwrap();

    let mut harness = Harness::new(&config, ScriptedDht::default());
    harness.dht.nodes = 8;

    let mut reactor: Reactor<Harness<ScriptedDht>> = Reactor::new().unwrap();
    setup(&mut reactor, None).unwrap();

    // The announcement handler hits the corrupt cursor on the first pass
    // and clears the running flag; run returns cleanly.
    reactor.run(&mut harness).unwrap();

    assert!(harness.announces.is_empty());
}
