//! Container Controller (C2 — spec.md §4.2).
//!
//! Creates, inspects, and tears down the long-lived execution container for
//! one judging session, and runs commands inside it. Grounded on
//! `hyperbox-core::runtime::docker::DockerRuntime`, generalized from "start
//! an OCI workload" to "keep one privileged, cgroup-namespaced container
//! alive for repeated `exec`s across many test cases."

use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::service::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::error::{JudgeError, Result};
use crate::shim::{CmdOutput, CommandShim};
use crate::types::{ContainerId, SessionConfig};

/// Owns the lifecycle of a single judging session's container.
///
/// When `config.dry_run` is set, `client` is never populated and every
/// method short-circuits through [`CommandShim`]'s dry-run branch instead
/// of touching a real Docker daemon (spec.md §6, §9).
pub struct ContainerController {
    client: Option<Docker>,
    shim: CommandShim,
    config: SessionConfig,
    container_id: Option<ContainerId>,
    container_name: String,
}

impl ContainerController {
    /// Connect to the local Docker daemon, unless running in dry-run mode.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let client = if config.dry_run {
            None
        } else {
            Some(
                Docker::connect_with_local_defaults()
                    .map_err(|e| JudgeError::DockerDaemon(e.to_string()))?,
            )
        };
        let shim = CommandShim::new(config.dry_run);
        let container_name = config.resolved_container_name();
        Ok(Self {
            client,
            shim,
            config,
            container_id: None,
            container_name,
        })
    }

    /// Whether this controller is running in dry-run mode.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Probe daemon liveness (spec.md §4.2 `ensure_daemon`).
    #[instrument(skip(self))]
    pub async fn ensure_daemon(&self) -> Result<()> {
        let Some(client) = &self.client else {
            debug!("dry run: skipping daemon liveness probe");
            return Ok(());
        };
        client
            .ping()
            .await
            .map_err(|e| JudgeError::DockerDaemon(e.to_string()))?;
        debug!("container daemon is reachable");
        Ok(())
    }

    /// The resolved container name (generated if the caller didn't supply one).
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Currently known container id, if the container has been created.
    #[must_use]
    pub fn container_id(&self) -> Option<&ContainerId> {
        self.container_id.as_ref()
    }

    /// Start the long-lived container for this session (spec.md §4.2 `create`).
    ///
    /// Mounts `host_src_dir` at `container_work_dir`, runs as
    /// `container_user` with a private cgroup namespace and `--privileged`,
    /// sets the container-level memory/swap caps strictly above the
    /// per-test limits, and keeps it alive via an idle `sleep infinity`. In
    /// dry-run mode, no container is created; a placeholder id is recorded
    /// so the rest of the session proceeds as if one existed.
    #[instrument(skip(self))]
    pub async fn create(&mut self) -> Result<()> {
        if self.config.dry_run {
            println!("{}", render_create_argv(&self.config, &self.container_name).join(" \\\n    "));
            self.container_id = Some(ContainerId::from_string(format!(
                "dry-run-{}",
                self.container_name
            )));
            info!(container = %self.container_name, "dry run: skipping container creation");
            return Ok(());
        }

        let client = self
            .client
            .as_ref()
            .expect("client is always present when dry_run is false");
        let constraints = &self.config.constraints;

        let binds = if self.config.volume.is_some() {
            None
        } else {
            Some(vec![format!(
                "{}:{}",
                self.config.host_src_dir.display(),
                self.config.container_work_dir.display()
            )])
        };

        let host_config = HostConfig {
            binds,
            privileged: Some(true),
            cgroupns_mode: Some(bollard::models::HostConfigCgroupnsModeEnum::PRIVATE),
            memory: Some((constraints.container_memory_limit_mb() * 1_048_576) as i64),
            memory_swap: Some(
                (constraints.container_memory_swap_limit_mb() * 1_048_576) as i64,
            ),
            auto_remove: Some(true),
            ..Default::default()
        };

        let config = Config {
            image: Some(self.config.docker_image.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            working_dir: Some(self.config.container_work_dir.display().to_string()),
            user: Some(self.config.container_user.clone()),
            tty: Some(true),
            attach_stdin: Some(true),
            open_stdin: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: self.container_name.clone(),
            platform: None,
        };

        let created = client
            .create_container(Some(options), config)
            .await
            .map_err(|e| JudgeError::ContainerCreate(e.to_string()))?;

        client
            .start_container(&self.container_name, None::<bollard::container::StartContainerOptions<String>>)
            .await
            .map_err(|e| JudgeError::ContainerCreate(e.to_string()))?;

        self.container_id = Some(ContainerId::from_string(created.id));
        info!(container = %self.container_name, "container created and started");
        Ok(())
    }

    /// Run `argv` inside the container, capturing stdout/stderr/exit code
    /// (spec.md §4.2 `exec_inside`), delegating to the Command Shim (C1) for
    /// dry-run short-circuiting and the layer-3 wall-clock fallback timeout
    /// (`5 × time_limit_s`, spec.md §4.1/§5). Stdin, when provided, is piped
    /// in before the exec is awaited.
    #[instrument(skip(self, stdin))]
    pub async fn exec_inside(&self, argv: &[String], stdin: Option<&str>) -> Result<CmdOutput> {
        if self.config.dry_run {
            return self.shim.exec(argv, stdin, None).await;
        }

        let fallback = Duration::from_secs(self.config.constraints.fallback_timeout_s());
        match tokio::time::timeout(fallback, self.exec_inside_live(argv, stdin)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(container = %self.container_name, "exec wall-clock fallback timeout fired");
                Ok(CmdOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: 124,
                    wall_time: fallback,
                    timed_out: true,
                })
            }
        }
    }

    async fn exec_inside_live(&self, argv: &[String], stdin: Option<&str>) -> Result<CmdOutput> {
        let client = self
            .client
            .as_ref()
            .expect("client is always present when dry_run is false");
        let start = std::time::Instant::now();

        let exec_options = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            attach_stdin: Some(stdin.is_some()),
            env: None::<Vec<String>>,
            ..Default::default()
        };

        let exec = client
            .create_exec(&self.container_name, exec_options)
            .await
            .map_err(|e| JudgeError::Cmd(format!("failed to create exec: {e}")))?;

        let start_result = client
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| JudgeError::Cmd(format!("failed to start exec: {e}")))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, mut input } = start_result {
            if let Some(data) = stdin {
                use tokio::io::AsyncWriteExt;
                let _ = input.write_all(data.as_bytes()).await;
            }
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(bollard::container::LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(bollard::container::LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Err(e) => warn!(error = %e, "exec output stream error"),
                    _ => {}
                }
            }
        }

        let inspect = client
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| JudgeError::Cmd(format!("failed to inspect exec: {e}")))?;

        Ok(CmdOutput {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(-1) as i32,
            wall_time: start.elapsed(),
            timed_out: false,
        })
    }

    /// Best-effort stop; a no-op if the container was never created
    /// (spec.md §4.2 `stop`).
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let Some(_id) = &self.container_id else {
            return Ok(());
        };

        let Some(client) = &self.client else {
            info!(container = %self.container_name, "dry run: skipping container teardown");
            return Ok(());
        };

        client
            .stop_container(
                &self.container_name,
                Some(StopContainerOptions { t: 5 }),
            )
            .await
            .map_err(|e| JudgeError::ContainerCleanup(e.to_string()))?;

        // auto_remove is set, but remove defensively in case the daemon
        // didn't honor it (e.g. already stopped).
        let _ = client
            .remove_container(
                &self.container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        info!(container = %self.container_name, "container stopped");
        Ok(())
    }
}

/// Render the equivalent `docker run` command line for `debug!`/dry-run
/// display, matching the shape of `main.py::_create_container`'s
/// argv-as-list construction.
#[must_use]
pub fn render_create_argv(config: &SessionConfig, container_name: &str) -> Vec<String> {
    let c = &config.constraints;
    vec![
        "docker".into(),
        "run".into(),
        "--rm".into(),
        "--interactive".into(),
        "--tty".into(),
        "--detach".into(),
        "--mount".into(),
        format!(
            "type=bind,source={},target={}",
            config.host_src_dir.display(),
            config.container_work_dir.display()
        ),
        "--workdir".into(),
        config.container_work_dir.display().to_string(),
        "--user".into(),
        config.container_user.clone(),
        "--cgroupns".into(),
        "private".into(),
        "--privileged".into(),
        "--memory".into(),
        format!("{}m", c.container_memory_limit_mb()),
        "--memory-swap".into(),
        format!("{}m", c.container_memory_swap_limit_mb()),
        "--name".into(),
        container_name.to_string(),
        config.docker_image.clone(),
        "sleep".into(),
        "infinity".into(),
    ]
}
