// src/engine/phase.rs

//! Phase definitions and the ordered pipeline of a nightly run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Timeouts;
use crate::fs::ResolvedImage;
use crate::types::PowerMode;

/// File whose last line identifies the image a node is running.
pub const IMAGE_MARKER_FILE: &str = "/etc/rhubarbe-image";

/// What a phase does to each active node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseKind {
    /// Send a power action and check its post-condition.
    Power(PowerMode),
    /// Multicast an image to all active nodes.
    LoadImage { image: String, path: PathBuf },
    /// Wait for nodes to answer over ssh.
    WaitReachable { image: String },
    /// Check the image marker against the expected substrings.
    CheckImage { image: String, command: String },
}

/// One fan-out / fan-in step of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
    /// Wall-clock budget for the whole fan-in.
    pub deadline: Duration,
    /// Whether node failures are handled by excluding the node (every phase
    /// built by [`build_pipeline`]) rather than aborting the run.
    pub per_node: bool,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Phase {
    pub fn power(mode: PowerMode, deadline: Duration) -> Self {
        Self {
            name: format!("power-{mode}"),
            kind: PhaseKind::Power(mode),
            deadline,
            per_node: true,
        }
    }

    /// `None` when the image artifact was never located.
    pub fn load(image: &ResolvedImage, deadline: Duration) -> Option<Self> {
        let path = image.path.clone()?;
        Some(Self {
            name: format!("load-{}", image.name),
            kind: PhaseKind::LoadImage {
                image: image.name.clone(),
                path,
            },
            deadline,
            per_node: true,
        })
    }

    pub fn wait_reachable(image: &ResolvedImage, deadline: Duration) -> Self {
        Self {
            name: format!("wait-ssh-{}", image.name),
            kind: PhaseKind::WaitReachable {
                image: image.name.clone(),
            },
            deadline,
            per_node: true,
        }
    }

    pub fn check_image(image: &ResolvedImage, deadline: Duration) -> Self {
        Self {
            name: format!("check-{}", image.name),
            kind: PhaseKind::CheckImage {
                image: image.name.clone(),
                command: marker_check_command(&image.markers),
            },
            deadline,
            per_node: true,
        }
    }
}

/// Remote command that exits 0 iff the last line of the image marker
/// contains one of `markers`.
pub fn marker_check_command(markers: &[String]) -> String {
    format!(
        "tail -1 {IMAGE_MARKER_FILE} | grep -E -q '{}'",
        markers.join("|")
    )
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Reduced mode: only power on, no image loading.
    pub dry_run: bool,
    /// Only check the first reference image.
    pub speedy: bool,
}

/// The images a run will check, in order.
pub fn checked_images<T>(images: &[T], options: PipelineOptions) -> &[T] {
    if options.speedy {
        &images[..images.len().min(1)]
    } else {
        images
    }
}

/// Build the ordered phase list:
/// power on / reset / off, then load / wait / check for each image.
pub fn build_pipeline(
    images: &[ResolvedImage],
    timeouts: &Timeouts,
    options: PipelineOptions,
) -> Vec<Phase> {
    let mut phases = Vec::new();

    let modes: &[PowerMode] = if options.dry_run {
        &[PowerMode::On]
    } else {
        &[PowerMode::On, PowerMode::Reset, PowerMode::Off]
    };
    phases.extend(modes.iter().map(|mode| Phase::power(*mode, timeouts.power)));

    for image in checked_images(images, options) {
        if !options.dry_run {
            phases.extend(Phase::load(image, timeouts.load));
        }
        phases.push(Phase::wait_reachable(image, timeouts.wait_ssh));
        phases.push(Phase::check_image(image, timeouts.check_image));
    }

    phases
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeouts() -> Timeouts {
        Timeouts {
            power: Duration::from_secs(1),
            power_check_delay: Duration::from_secs(1),
            load: Duration::from_secs(2),
            wait_ssh: Duration::from_secs(3),
            check_image: Duration::from_secs(4),
            status: Duration::from_secs(1),
        }
    }

    fn images() -> Vec<ResolvedImage> {
        ["ubuntu-18", "fedora-31"]
            .iter()
            .map(|name| ResolvedImage {
                name: name.to_string(),
                path: Some(PathBuf::from(format!("/images/{name}.ndz"))),
                markers: vec![name.to_string()],
            })
            .collect()
    }

    fn names(phases: &[Phase]) -> Vec<&str> {
        phases.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn full_pipeline_order_and_deadlines() {
        let phases = build_pipeline(&images(), &timeouts(), PipelineOptions::default());
        assert_eq!(
            names(&phases),
            vec![
                "power-on",
                "power-reset",
                "power-off",
                "load-ubuntu-18",
                "wait-ssh-ubuntu-18",
                "check-ubuntu-18",
                "load-fedora-31",
                "wait-ssh-fedora-31",
                "check-fedora-31",
            ]
        );
        assert_eq!(phases[3].deadline, Duration::from_secs(2));
        assert_eq!(phases[4].deadline, Duration::from_secs(3));
        assert_eq!(phases[5].deadline, Duration::from_secs(4));
        assert!(phases.iter().all(|p| p.per_node));
    }

    #[test]
    fn dry_and_speedy_reduce_the_pipeline() {
        let options = PipelineOptions {
            dry_run: true,
            speedy: true,
        };
        let phases = build_pipeline(&images(), &timeouts(), options);
        assert_eq!(
            names(&phases),
            vec!["power-on", "wait-ssh-ubuntu-18", "check-ubuntu-18"]
        );
    }

    #[test]
    fn unlocated_images_get_no_load_phase() {
        let image = ResolvedImage {
            path: None,
            ..images().remove(0)
        };
        assert_eq!(Phase::load(&image, Duration::from_secs(2)), None);

        let options = PipelineOptions {
            dry_run: true,
            speedy: false,
        };
        let phases = build_pipeline(&[image], &timeouts(), options);
        assert_eq!(
            names(&phases),
            vec!["power-on", "wait-ssh-ubuntu-18", "check-ubuntu-18"]
        );
    }

    #[test]
    fn marker_command_joins_alternatives() {
        let cmd = marker_check_command(&["ubuntu-18".to_string(), "u18".to_string()]);
        assert_eq!(cmd, "tail -1 /etc/rhubarbe-image | grep -E -q 'ubuntu-18|u18'");
    }
}
