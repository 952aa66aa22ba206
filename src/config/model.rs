// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::NodeFailurePolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [testbed]
/// name = "R2lab"
/// principal = "inria_r2lab.nightly"
/// nodes = "1-37"
///
/// [timeouts]
/// load = "20m"
/// wait_ssh = "4m"
///
/// [[image]]
/// name = "ubuntu-18"
/// markers = ["ubuntu-18", "u18"]
/// ```
///
/// All sections are optional and have reasonable defaults. This is the raw,
/// unvalidated form; durations are still strings. Use
/// `ConfigFile::try_from(raw)` (see `validate.rs`) to get a typed config.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub testbed: TestbedSection,

    #[serde(default)]
    pub timeouts: TimeoutsSection,

    #[serde(default)]
    pub networking: NetworkingSection,

    /// Reference images, checked in this order.
    ///
    /// This is the TOML `[[image]]` array. When absent, the two historical
    /// reference images are used.
    #[serde(default = "default_images", rename = "image")]
    pub image: Vec<ImageSpec>,

    #[serde(default)]
    pub images: ImagesSection,

    #[serde(default)]
    pub mail: MailSection,

    #[serde(default)]
    pub run: RunSection,

    #[serde(default)]
    pub commands: CommandsSection,
}

impl Default for RawConfigFile {
    fn default() -> Self {
        Self {
            testbed: TestbedSection::default(),
            timeouts: TimeoutsSection::default(),
            networking: NetworkingSection::default(),
            image: default_images(),
            images: ImagesSection::default(),
            mail: MailSection::default(),
            run: RunSection::default(),
            commands: CommandsSection::default(),
        }
    }
}

/// `[testbed]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TestbedSection {
    /// Display name, used in the mail subject.
    #[serde(default = "default_testbed_name")]
    pub name: String,

    /// Resource name handed to the lease service.
    #[serde(default = "default_resource")]
    pub resource: String,

    /// Principal (slice) that owns the nightly leases.
    #[serde(default = "default_principal")]
    pub principal: String,

    /// Default node selection, in selector syntax (`"1-37"`, `"1-10,~4"`).
    #[serde(default = "default_nodes")]
    pub nodes: String,

    /// Prefix of the control-plane hostname (`reboot07`).
    #[serde(default = "default_control_prefix")]
    pub control_prefix: String,

    /// Prefix of the data-plane / ssh hostname (`fit07`).
    #[serde(default = "default_ssh_prefix")]
    pub ssh_prefix: String,
}

impl Default for TestbedSection {
    fn default() -> Self {
        Self {
            name: default_testbed_name(),
            resource: default_resource(),
            principal: default_principal(),
            nodes: default_nodes(),
            control_prefix: default_control_prefix(),
            ssh_prefix: default_ssh_prefix(),
        }
    }
}

fn default_testbed_name() -> String {
    "R2lab".to_string()
}

fn default_resource() -> String {
    "r2lab".to_string()
}

fn default_principal() -> String {
    "inria_r2lab.nightly".to_string()
}

fn default_nodes() -> String {
    "1-37".to_string()
}

fn default_control_prefix() -> String {
    "reboot".to_string()
}

fn default_ssh_prefix() -> String {
    "fit".to_string()
}

/// `[timeouts]` section, as duration strings (`"5s"`, `"20m"`).
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsSection {
    /// Deadline for each power phase (on / reset / off).
    #[serde(default = "default_power_timeout")]
    pub power: String,

    /// Delay between a power action and its post-condition check.
    #[serde(default = "default_power_check_delay")]
    pub power_check_delay: String,

    /// Deadline for loading one image on all nodes.
    #[serde(default = "default_load_timeout")]
    pub load: String,

    /// Deadline for nodes to become reachable over ssh after a load.
    #[serde(default = "default_wait_ssh_timeout")]
    pub wait_ssh: String,

    /// Deadline for the image marker verification.
    #[serde(default = "default_check_image_timeout")]
    pub check_image: String,

    /// Bound on the best-effort status notifications of one phase.
    #[serde(default = "default_status_timeout")]
    pub status: String,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            power: default_power_timeout(),
            power_check_delay: default_power_check_delay(),
            load: default_load_timeout(),
            wait_ssh: default_wait_ssh_timeout(),
            check_image: default_check_image_timeout(),
            status: default_status_timeout(),
        }
    }
}

fn default_power_timeout() -> String {
    "60s".to_string()
}

fn default_power_check_delay() -> String {
    "5s".to_string()
}

fn default_load_timeout() -> String {
    "20m".to_string()
}

fn default_wait_ssh_timeout() -> String {
    "4m".to_string()
}

fn default_check_image_timeout() -> String {
    "1m".to_string()
}

fn default_status_timeout() -> String {
    "10s".to_string()
}

/// `[networking]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkingSection {
    /// Multicast bandwidth for image loading, in Mbps.
    #[serde(default = "default_bandwidth")]
    pub bandwidth: u32,

    /// Backoff between two ssh reachability attempts.
    #[serde(default = "default_ssh_backoff")]
    pub ssh_backoff: String,
}

impl Default for NetworkingSection {
    fn default() -> Self {
        Self {
            bandwidth: default_bandwidth(),
            ssh_backoff: default_ssh_backoff(),
        }
    }
}

fn default_bandwidth() -> u32 {
    50
}

fn default_ssh_backoff() -> String {
    "3s".to_string()
}

/// One `[[image]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageSpec {
    /// Image name as known to the image repository.
    pub name: String,

    /// Substrings expected on the last line of the on-node image marker; any
    /// of them means the right image is running.
    pub markers: Vec<String>,
}

impl ImageSpec {
    pub fn new(name: &str, markers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }
}

fn default_images() -> Vec<ImageSpec> {
    vec![
        ImageSpec::new("ubuntu-18", &["ubuntu-18", "u18"]),
        ImageSpec::new("fedora-31", &["fedora-31", "f31"]),
    ]
}

/// `[images]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesSection {
    /// Directories searched, in order, for image artifacts.
    #[serde(default = "default_search_path")]
    pub search_path: Vec<PathBuf>,
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            search_path: default_search_path(),
        }
    }
}

fn default_search_path() -> Vec<PathBuf> {
    vec![PathBuf::from("/var/lib/rhubarbe-images")]
}

/// `[mail]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct MailSection {
    #[serde(default = "default_mail_from")]
    pub from: String,

    #[serde(default = "default_mail_to")]
    pub to: Vec<String>,

    /// Recipients used instead of `to` in verbose (dry) mode.
    #[serde(default)]
    pub dev_to: Vec<String>,
}

impl Default for MailSection {
    fn default() -> Self {
        Self {
            from: default_mail_from(),
            to: default_mail_to(),
            dev_to: Vec::new(),
        }
    }
}

fn default_mail_from() -> String {
    "nightly@faraday.inria.fr".to_string()
}

fn default_mail_to() -> Vec<String> {
    vec!["fit-r2lab-dev@inria.fr".to_string()]
}

/// `[run]` section.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct RunSection {
    /// Whether excluded nodes turn the run status into a failure.
    #[serde(default)]
    pub on_node_failure: NodeFailurePolicy,
}

/// `[commands]` section: shell templates for the command-backed
/// collaborators (see `exec::shell`).
///
/// Placeholders are written `{name}` and substituted shell-quoted.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsSection {
    /// `{mode}` `{host}` `{control}` `{id}`
    #[serde(default = "default_power_cmd")]
    pub power: String,

    /// Post-condition check; the last word of stdout is the power state.
    #[serde(default = "default_power_status_cmd")]
    pub power_status: String,

    /// `{image}` `{bandwidth}` `{timeout}` `{hosts}`
    #[serde(default = "default_load_cmd")]
    pub load: String,

    /// `{backoff}` `{timeout}` `{host}`
    #[serde(default = "default_wait_cmd")]
    pub wait: String,

    /// `{host}` `{command}`
    #[serde(default = "default_remote_cmd")]
    pub remote: String,

    /// `{resource}`; prints `principal [start end]` or nothing.
    #[serde(default = "default_lease_cmd")]
    pub lease: String,

    /// `{id}` `{key}` `{value}`
    #[serde(default = "default_status_cmd")]
    pub status: String,

    /// `{hosts}`
    #[serde(default = "default_all_off_cmd")]
    pub all_off: String,

    /// Receives the full message on stdin.
    #[serde(default = "default_mail_cmd")]
    pub mail: String,
}

impl Default for CommandsSection {
    fn default() -> Self {
        Self {
            power: default_power_cmd(),
            power_status: default_power_status_cmd(),
            load: default_load_cmd(),
            wait: default_wait_cmd(),
            remote: default_remote_cmd(),
            lease: default_lease_cmd(),
            status: default_status_cmd(),
            all_off: default_all_off_cmd(),
            mail: default_mail_cmd(),
        }
    }
}

fn default_power_cmd() -> String {
    "rhubarbe {mode} {host}".to_string()
}

fn default_power_status_cmd() -> String {
    "rhubarbe status {host}".to_string()
}

fn default_load_cmd() -> String {
    "rhubarbe load -i {image} -b {bandwidth} -t {timeout} {hosts}".to_string()
}

fn default_wait_cmd() -> String {
    "rhubarbe wait -b {backoff} -t {timeout} {host}".to_string()
}

fn default_remote_cmd() -> String {
    "ssh -o BatchMode=yes -o StrictHostKeyChecking=no root@{host} {command}".to_string()
}

fn default_lease_cmd() -> String {
    "rhubarbe leases --current {resource}".to_string()
}

fn default_status_cmd() -> String {
    "r2lab-sidecar-client --node {id} --set {key}={value}".to_string()
}

fn default_all_off_cmd() -> String {
    "rhubarbe bye {hosts}".to_string()
}

fn default_mail_cmd() -> String {
    "/usr/sbin/sendmail -t".to_string()
}

/// Typed timeouts, parsed from [`TimeoutsSection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub power: Duration,
    pub power_check_delay: Duration,
    pub load: Duration,
    pub wait_ssh: Duration,
    pub check_image: Duration,
    pub status: Duration,
}

/// Typed networking parameters, parsed from [`NetworkingSection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Networking {
    pub bandwidth: u32,
    pub ssh_backoff: Duration,
}

/// Validated configuration.
///
/// Can only be obtained from a [`RawConfigFile`] through `TryFrom`, so the
/// rest of the crate never sees an unparsed duration or an empty image list.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub testbed: TestbedSection,
    pub timeouts: Timeouts,
    pub networking: Networking,
    pub images: Vec<ImageSpec>,
    pub image_search_path: Vec<PathBuf>,
    pub mail: MailSection,
    pub run: RunSection,
    pub commands: CommandsSection,
}
