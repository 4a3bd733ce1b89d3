//! Shell command strings issued by the workflow verbs.
//!
//! Values are interpolated as-is. Paths, image names and the user's command
//! are trusted input; quoting inside them is the caller's responsibility.

use chrono::{DateTime, Utc};

/// Fuzzer processes on the host, one `PID COMMAND ARGS...` line each
pub const FUZZER_PROCESSES: &str = "pgrep -a -i fuzzer || true";

/// CPU usage (user + system) as a percentage
pub const CPU_USAGE: &str = r#"top -bn1 | grep "Cpu(s)" | awk '{print $2 + $4 "%"}' || echo "N/A""#;

/// Memory usage as `USED used / TOTAL total`
pub const MEMORY_USAGE: &str = r#"free -h | grep Mem | awk '{print $3 " used / " $2 " total"}' || echo "N/A""#;

/// Root filesystem usage as `USED used / TOTAL total (PCT)`
pub const DISK_USAGE: &str =
    r#"df -h / | tail -1 | awk '{print $3 " used / " $2 " total (" $5 ")"}' || echo "N/A""#;

pub fn build_image(remote_path: &str, image: &str, dockerfile: &str) -> String {
    format!(r#"cd {remote_path} && docker build -t "{image}" -f {dockerfile} ."#)
}

/// Run `command` with bash in a throwaway container that mounts the remote path at `/app`.
pub fn run_in_container(remote_path: &str, container_name: &str, image: &str, command: &str) -> String {
    format!(
        r#"cd {remote_path} && docker run --rm -v "{remote_path}:/app" -w /app --name "{container_name}" "{image}" bash -c "{command}""#
    )
}

/// Running containers of `image`, one `ID NAME STATUS (AGE)` line each.
pub fn list_containers(image: &str) -> String {
    format!(
        r#"docker ps --filter "ancestor={image}" --format "{{{{.ID}}}} {{{{.Names}}}} {{{{.Status}}}} ({{{{.RunningFor}}}})" 2>/dev/null || true"#
    )
}

/// ID of the first running container of `image`, or empty output.
pub fn first_container_id(image: &str) -> String {
    format!(r#"docker ps --filter "ancestor={image}" --format "{{{{.ID}}}}" | head -1"#)
}

pub fn stop_all(image: &str) -> String {
    format!(r#"docker ps --filter "ancestor={image}" -q | xargs -r docker stop --timeout -1 || true"#)
}

pub fn remove_all(image: &str) -> String {
    format!(r#"docker ps -a --filter "ancestor={image}" -q | xargs -r docker rm || true"#)
}

pub fn stop_container(container_id: &str) -> String {
    format!("docker stop --timeout -1 {container_id}")
}

pub fn follow_logs(container_id: &str) -> String {
    format!("docker logs -f {container_id}")
}

/// `PREFIX-N` where N is the sub-second nanoseconds of `now` modulo 10000.
pub fn container_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.timestamp_subsec_nanos() % 10_000)
}
