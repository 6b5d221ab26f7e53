//! Analysis flavors: which capabilities a session may use and how it is
//! seeded.

use chrono::{DateTime, Utc};
use scanpilot_core::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of analysis a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFlavor {
    /// Probe one URL's parameters for injection flaws
    Injection,
    /// Map a domain's subdomains and open ports
    Domain,
    /// Crawl and check a whole website
    Site,
}

impl AnalysisFlavor {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisFlavor::Injection => "injection",
            AnalysisFlavor::Domain => "domain",
            AnalysisFlavor::Site => "site",
        }
    }

    /// The capabilities exposed to the backend for this flavor.
    pub fn capability_names(self) -> &'static [&'static str] {
        match self {
            AnalysisFlavor::Injection => &[
                "scan_sql_injection",
                "scan_template_injection",
                "fetch_url_content",
            ],
            AnalysisFlavor::Domain => &["scan_subdomain_enumeration", "scan_port_scanning"],
            AnalysisFlavor::Site => &["scan_full_site"],
        }
    }

    /// The first user message of a session against `target`.
    pub fn seed_prompt(self, target: &str, now: DateTime<Utc>) -> String {
        let time = now.format("%Y-%m-%d %H:%M:%S UTC");
        match self {
            AnalysisFlavor::Injection => format!(
                "You are a web security analyst. The current time is {time}.\n\
                 Assess the endpoint {target} for injection vulnerabilities.\n\
                 \n\
                 1. Fetch the page first if you need to understand its parameters or forms.\n\
                 2. Test the parameters for SQL injection and for server-side template injection. \
                 Independent scans may be requested together.\n\
                 3. When the evidence is in, stop calling tools and write the report.\n\
                 \n\
                 Report in Markdown with these sections: Target, Summary, Findings \
                 (one entry per vulnerable parameter with technique, payload and evidence), \
                 Risk rating, and Remediation. If nothing is vulnerable, say so plainly \
                 and list what was tested."
            ),
            AnalysisFlavor::Domain => format!(
                "You are a reconnaissance analyst. The current time is {time}.\n\
                 Map the attack surface of the domain {target}.\n\
                 \n\
                 1. Enumerate its subdomains.\n\
                 2. Scan the domain, and the most interesting subdomains you find, for open ports.\n\
                 3. When you have enough information, stop calling tools and write the report.\n\
                 \n\
                 Report in Markdown with these sections: Target, Subdomains (table of host and \
                 address), Exposed services (table of host, port, protocol and service), \
                 Notable observations, and Suggested next steps."
            ),
            AnalysisFlavor::Site => format!(
                "You are a web security analyst. The current time is {time}.\n\
                 Crawl the website {target} and review everything the crawl reports.\n\
                 \n\
                 Run the full-site scan, then stop calling tools and write the report.\n\
                 \n\
                 Report in Markdown with these sections: Target, Site map summary, Findings \
                 (each with the affected URL, issue and evidence), Risk rating, and Remediation."
            ),
        }
    }
}

impl fmt::Display for AnalysisFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisFlavor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "injection" => Ok(AnalysisFlavor::Injection),
            "domain" => Ok(AnalysisFlavor::Domain),
            "site" => Ok(AnalysisFlavor::Site),
            other => Err(Error::Config {
                message: format!("unknown analysis flavor '{other}' (expected injection, domain or site)"),
            }),
        }
    }
}
