use port_scan_rs::services::{service_name, TLS_PORTS, UNKNOWN_SERVICE};

#[test]
fn mail_ports_have_names() {
    assert_eq!(service_name(25), "smtp");
    assert_eq!(service_name(587), "smtp-submission");
    assert_eq!(service_name(110), "pop3");
    assert_eq!(service_name(143), "imap");
}

#[test]
fn plaintext_web_ports_are_not_tls() {
    assert_eq!(service_name(8080), "http-alt");
    assert!(!TLS_PORTS.contains(&8080));
    assert!(TLS_PORTS.contains(&8443));
    assert_eq!(service_name(31337), UNKNOWN_SERVICE);
}
