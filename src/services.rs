/// Name reported for ports missing from the catalog.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Well-known TCP ports and the service usually listening there. Sorted by port.
const SERVICES: &[(u16, &str)] = &[
    (20, "ftp-data"),
    (21, "ftp"),
    (22, "ssh"),
    (23, "telnet"),
    (25, "smtp"),
    (53, "dns"),
    (80, "http"),
    (110, "pop3"),
    (143, "imap"),
    (443, "https"),
    (465, "smtps"),
    (587, "smtp-submission"),
    (636, "ldaps"),
    (993, "imaps"),
    (995, "pop3s"),
    (1433, "mssql"),
    (3306, "mysql"),
    (3389, "rdp"),
    (5432, "postgresql"),
    (5900, "vnc"),
    (6379, "redis"),
    (8080, "http-alt"),
    (8443, "https-alt"),
    (27017, "mongodb"),
];

/// Ports whose services speak TLS from the first byte.
pub const TLS_PORTS: &[u16] = &[443, 465, 636, 993, 995, 8443];

/// Look up the expected service name for a port.
pub fn service_name(port: u16) -> &'static str {
    SERVICES
        .binary_search_by_key(&port, |&(p, _)| p)
        .map(|i| SERVICES[i].1)
        .unwrap_or(UNKNOWN_SERVICE)
}
