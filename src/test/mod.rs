use std::net::IpAddr;

use maplit::hashmap;

use crate::addr::AddrRange;
use crate::error::{CompileError, Entity};
use crate::filter::{Direction, FilterType, Verdict};
use crate::instance::Role;
use crate::protocol::GroupMemProtocol;
use crate::resolver::StaticResolver;
use crate::{compile, compile_with_resolver, CompileOptions, Configuration};

const MULTI: &str = include_str!("fixtures/multi.conf");

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn resolver() -> StaticResolver {
    StaticResolver::from(hashmap! {
        "eth0".to_string() => 2,
        "eth1".to_string() => 3,
        "eth2".to_string() => 4,
        "eth3".to_string() => 5,
        "eth4".to_string() => 6,
    })
}

fn compile_ok(script: &str) -> Configuration {
    compile_with_resolver(script, &CompileOptions::default(), &resolver()).expect("To compile")
}

fn compile_err(script: &str) -> CompileError {
    compile_with_resolver(script, &CompileOptions::default(), &resolver())
        .expect_err("To fail compiling")
}

fn allowed(
    config: &Configuration,
    instance: &str,
    role: Role,
    if_name: &str,
    direction: Direction,
    group: &str,
    source: &str,
) -> bool {
    config
        .instance(instance)
        .and_then(|i| i.interface(role, if_name))
        .expect("Interface to exist")
        .is_source_allowed(direction, if_name, ip(group), ip(source))
}

#[test]
fn whitelist_through_table_works() {
    let config = compile_ok(
        "protocol IGMPv3;\n\
         table T1 { 10.0.0.0/8 };\n\
         instance P1 { downstream: eth0 {IN: WHITELIST {eth0, 239.1.1.1, T1}} upstream: eth1 }",
    );

    assert_eq!(config.group_mem_protocol(), GroupMemProtocol::IgmpV3);
    assert_eq!(config.instance_names(), vec!["P1"]);

    let downstream = Role::Downstream;
    assert!(allowed(&config, "P1", downstream, "eth0", Direction::In, "239.1.1.1", "10.1.2.3"));
    assert!(!allowed(&config, "P1", downstream, "eth0", Direction::In, "239.1.1.1", "192.168.1.1"));

    let eth0 = config.instance("P1").unwrap().interface(downstream, "eth0").unwrap();
    assert_eq!(eth0.get_filter_type(Direction::In), Some(FilterType::Whitelist));
    assert_eq!(eth0.get_filter_type(Direction::Out), None);
    assert_eq!(
        eth0.get_saddr_set(Direction::In, "eth0", ip("239.1.1.1"))
            .into_iter()
            .collect::<Vec<_>>(),
        vec!["10.0.0.0/8".parse::<AddrRange>().unwrap()]
    );

    let group = config.resolved_interfaces("P1").expect("To be resolved");
    assert_eq!(group.downstreams[0].index.get(), 2);
    assert_eq!(group.upstreams[0].index.get(), 3);
}

#[test]
fn multi_instance_fixture_works() {
    let config = compile_ok(MULTI);
    assert_eq!(config.group_mem_protocol(), GroupMemProtocol::IgmpV2);
    assert_eq!(config.instance_names(), vec!["video", "office"]);
    assert_eq!(config.tables().len(), 2);
    assert_eq!(
        config.tables().get("all_sources").unwrap().entries.len(),
        3
    );

    // Inline whitelist on eth2 only
    assert!(allowed(&config, "video", Role::Downstream, "eth2", Direction::In, "239.1.1.7", "192.168.0.50"));
    assert!(!allowed(&config, "video", Role::Downstream, "eth2", Direction::In, "239.1.1.7", "192.168.0.100"));
    // Group outside the rule, unmatched default
    assert!(!allowed(&config, "video", Role::Downstream, "eth2", Direction::In, "239.2.0.1", "10.0.0.1"));
    // eth3 has no inbound filter
    assert!(!allowed(&config, "video", Role::Downstream, "eth3", Direction::In, "239.1.1.7", "10.0.0.1"));

    // `*` binding reached both downstreams
    for if_name in ["eth2", "eth3"] {
        assert!(allowed(&config, "video", Role::Downstream, if_name, Direction::Out, "239.9.9.9", "172.20.0.1"));
        assert!(!allowed(&config, "video", Role::Downstream, if_name, Direction::Out, "239.9.9.9", "8.8.8.8"));
    }

    // Blacklist
    assert!(!allowed(&config, "video", Role::Upstream, "eth1", Direction::In, "239.255.255.250", "1.2.3.4"));
    assert!(allowed(&config, "office", Role::Downstream, "eth4", Direction::In, "239.0.0.1", "10.9.9.8"));
    assert!(!allowed(&config, "office", Role::Downstream, "eth4", Direction::In, "239.0.0.1", "10.9.9.10"));

    // Both instances share eth1
    let video = config.resolved_interfaces("video").unwrap();
    let office = config.resolved_interfaces("office").unwrap();
    assert!(video.contains(3) && office.contains(3));
    assert_eq!(video.handles().len(), 3);
}

#[test]
fn filter_type_is_symmetric_in_direction() {
    let config = compile_ok(
        "pinstance p: eth1 ==> eth0;\
         pinstance p downstream eth0 out whitelist {*, 239.0.0.0/8, 10.0.0.1}",
    );
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::Out, "239.1.1.1", "10.0.0.1"));
    assert!(!allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.0.0.1"));

    let config = compile_ok(
        "pinstance p: eth1 ==> eth0;\
         pinstance p downstream eth0 in whitelist {*, 239.0.0.0/8, 10.0.0.1}",
    );
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.0.0.1"));
    assert!(!allowed(&config, "p", Role::Downstream, "eth0", Direction::Out, "239.1.1.1", "10.0.0.1"));
}

#[test]
fn unmatched_verdict_is_configurable() {
    let script = "pinstance p: eth1 ==> eth0";
    let options = CompileOptions {
        unmatched: Verdict::Allow,
        ..Default::default()
    };
    let config = compile_with_resolver(script, &options, &resolver()).unwrap();
    assert_eq!(config.options(), &options);
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.0.0.1"));
    assert_eq!(
        config
            .instance("p")
            .unwrap()
            .interface(Role::Upstream, "eth1")
            .unwrap()
            .filters()
            .unmatched(),
        Verdict::Allow
    );

    let config = compile_ok(script);
    assert!(!allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.0.0.1"));
}

#[test]
fn mld_uses_ipv6() {
    let config = compile_ok(
        "protocol MLDv2;\n\
         table srcs { fd00::/8, 2001:db8::1 - 2001:db8::ff };\n\
         pinstance p: eth1 ==> eth0;\n\
         pinstance p downstream eth0 in whitelist {*, ff05::/16, srcs}",
    );
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "ff05::1:3", "2001:db8::10"));
    assert!(!allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "ff05::1:3", "2001:db8::1:0"));

    let err = compile_err("protocol MLDv1; pinstance p: eth1 ==> eth0; pinstance p downstream eth0 in whitelist {*, 239.1.1.1, *}");
    assert!(matches!(err, CompileError::MalformedCommand { line: 1, .. }));
}

#[test]
fn tables_of_the_other_family_are_rejected() {
    let err = compile_err(
        "table t { 10.0.0.1 };\n\
         protocol MLDv2;\n\
         pinstance p: eth1 ==> eth0;\n\
         pinstance p downstream eth0 in whitelist {*, ff05::1, t}",
    );
    assert!(matches!(
        err,
        CompileError::MalformedCommand { line: 4, ref message } if message.contains("IPv6")
    ));

    let err = compile_err("table v4 { 10.0.0.0/8 };\nprotocol MLDv1;\ntable v6 { table v4 }");
    assert!(matches!(err, CompileError::MalformedCommand { line: 3, .. }));

    // Wildcard-only tables fit either family
    let config = compile_ok(
        "table wild { * };\n\
         protocol MLDv2;\n\
         pinstance p: eth1 ==> eth0;\n\
         pinstance p downstream eth0 in whitelist {*, ff05::1, wild}",
    );
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "ff05::1", "fd00::1"));
}

#[test]
fn glued_punctuation_is_accepted() {
    let config = compile_ok(
        "table t { 10.0.0.1 -10.0.0.9, 10.1.0.1- 10.1.0.9 };\n\
         instance p { upstream:eth1 downstream:eth0 {IN:WHITELIST {*, 239.1.1.1, t}} };\n\
         pinstance q:eth1==>eth2;\n\
         pinstance q downstream eth2 in blacklist {*, *, [10.2.0.1 -10.2.0.5]}",
    );
    assert_eq!(config.tables().get("t").unwrap().entries.len(), 2);
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.0.0.5"));
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.1.0.9"));
    assert!(!allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.0.0.10"));
    assert!(!allowed(&config, "q", Role::Downstream, "eth2", Direction::In, "239.1.1.1", "10.2.0.3"));
    assert!(allowed(&config, "q", Role::Downstream, "eth2", Direction::In, "239.1.1.1", "10.2.0.6"));
}

#[test]
fn duplicates_are_rejected() {
    let err = compile_err("protocol IGMPv2;\nprotocol IGMPv3");
    assert!(matches!(
        err,
        CompileError::DuplicateDefinition { line: 2, entity: Entity::Protocol, .. }
    ));

    let err = compile_err("table t { 10.0.0.1 };\n\ntable t { 10.0.0.2 }");
    assert!(matches!(
        err,
        CompileError::DuplicateDefinition { line: 3, entity: Entity::Table, ref name } if name == "t"
    ));

    let err = compile_err("pinstance p: eth1 ==> eth0;\npinstance p: eth1 ==> eth2");
    assert!(matches!(
        err,
        CompileError::DuplicateDefinition { line: 2, entity: Entity::Instance, ref name } if name == "p"
    ));

    let err = compile_err("pinstance p: eth1 ==> eth0 eth0");
    assert!(matches!(
        err,
        CompileError::DuplicateDefinition { entity: Entity::Interface, .. }
    ));
}

#[test]
fn forward_references_are_rejected() {
    let err = compile_err("table a { table b };\ntable b { 10.0.0.1 }");
    assert!(matches!(
        err,
        CompileError::UnresolvedReference { line: 1, entity: Entity::Table, ref name } if name == "b"
    ));

    let err = compile_err("pinstance p downstream eth0 in whitelist {*, *, *};\npinstance p: eth1 ==> eth0");
    assert!(matches!(
        err,
        CompileError::UnresolvedReference { line: 1, entity: Entity::Instance, .. }
    ));

    let err = compile_err("pinstance p: eth1 ==> eth0;\npinstance p downstream eth9 in whitelist {*, *, *}");
    assert!(matches!(
        err,
        CompileError::UnresolvedReference { line: 2, entity: Entity::Interface, .. }
    ));
}

#[test]
fn conflicting_filter_types_are_rejected() {
    let err = compile_err(
        "pinstance p: eth1 ==> eth0;\n\
         pinstance p downstream eth0 in whitelist {*, *, 10.0.0.1};\n\
         pinstance p downstream eth0 in blacklist {*, *, 10.0.0.2}",
    );
    assert!(matches!(err, CompileError::MalformedCommand { line: 3, .. }));

    // Same type appends
    let config = compile_ok(
        "pinstance p: eth1 ==> eth0;\n\
         pinstance p downstream eth0 in whitelist {*, *, 10.0.0.1};\n\
         pinstance p downstream eth0 in whitelist {*, *, 10.0.0.2}",
    );
    assert!(allowed(&config, "p", Role::Downstream, "eth0", Direction::In, "239.1.1.1", "10.0.0.2"));
}

#[test]
fn unknown_interface_fails_whole_compile() {
    let err = compile_err("pinstance a: eth1 ==> eth0;\npinstance b: eth1 ==> wlan7");
    assert!(matches!(
        err,
        CompileError::UnknownInterface { ref instance, ref interface } if instance == "b" && interface == "wlan7"
    ));

    // Skipping resolution accepts the same script
    let config = compile(
        "pinstance a: eth1 ==> eth0;\npinstance b: eth1 ==> wlan7",
        &CompileOptions::debug_testing(),
    )
    .unwrap();
    assert_eq!(config.instance_names(), vec!["a", "b"]);
    assert!(config.resolved_interfaces("a").is_none());
}

#[test]
fn comments_and_blank_commands_are_ignored() {
    let config = compile_ok("# nothing here;\n;;\n  ; # still nothing\npinstance p: eth1 ==> eth0; ;");
    assert_eq!(config.instance_names(), vec!["p"]);
}

#[test]
fn configuration_dumps() {
    let config = compile_ok(MULTI);
    let text = config.to_string();
    assert!(text.contains("protocol IGMPv2"));
    assert!(text.contains("instance video"));
    assert!(text.contains("interfaces of office"));

    let json = serde_json::to_value(&config).expect("To serialize");
    assert_eq!(json["protocol"], "IGMPv2");
    assert_eq!(json["tables"][0]["name"], "local_sources");
    assert_eq!(json["instances"][1]["name"], "office");
    assert_eq!(json["interfaces"]["video"]["upstreams"][0]["index"], 3);
    assert_eq!(json["options"]["unmatched"], "deny");
}
