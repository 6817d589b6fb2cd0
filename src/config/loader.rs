// src/config/loader.rs

use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::{debug, info, warn};

use crate::condition::{add_not_safemode, condition_from_value};
use crate::config::model::{
    DaemonSettings, JobConfig, RunConfig, RunDirective, Settings, SettingsFile, TargetConfig,
};
use crate::dag::{BaseJob, Job, Target};
use crate::errors::{LaunchError, Result};
use crate::event::event_from_value;
use crate::event::events::add_on_demand;
use crate::fs::FileSystem;
use crate::types::{DaemonMode, NameKey};

/// Parse a single settings file.
///
/// This only performs TOML deserialization; conditions and events are
/// compiled when the file is merged.
pub fn load_file(fs: &dyn FileSystem, path: &Path) -> Result<SettingsFile> {
    let contents = fs.read_to_string(path)?;
    let file: SettingsFile = toml::from_str(&contents)?;
    Ok(file)
}

/// Expand `path` into settings files: a directory yields its `*.toml`
/// entries in sorted order.
pub fn collect_files(fs: &dyn FileSystem, path: &Path) -> Vec<PathBuf> {
    if fs.is_dir(path) {
        match fs.read_dir(path) {
            Ok(mut entries) => {
                entries.retain(|p| p.extension().is_some_and(|ext| ext == "toml") && !fs.is_dir(p));
                entries.sort();
                entries
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read settings directory");
                Vec::new()
            }
        }
    } else if fs.exists(path) {
        vec![path.to_path_buf()]
    } else {
        debug!(path = %path.display(), "settings path does not exist");
        Vec::new()
    }
}

/// Load and merge every settings file below `paths`.
///
/// A file that cannot be read or parsed is logged and skipped, as is any
/// single job or target that fails to compile. The daemon always gets a
/// usable (possibly empty) [`Settings`].
pub fn load_settings(fs: &dyn FileSystem, paths: &[PathBuf]) -> Settings {
    let mut settings = Settings::default();
    for root in paths {
        for path in collect_files(fs, root) {
            match load_file(fs, &path) {
                Ok(file) => {
                    debug!(path = %path.display(), "merging settings file");
                    settings.merge(file);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "skipping settings file"),
            }
        }
    }
    info!(
        jobs = settings.jobs.len(),
        targets = settings.targets.len(),
        "settings loaded"
    );
    settings
}

/// Default settings locations for the given mode.
pub fn default_config_paths(mode: DaemonMode) -> Vec<PathBuf> {
    match mode {
        DaemonMode::System => vec![PathBuf::from("/etc/launch_daemon")],
        DaemonMode::User => std::env::var_os("HOME")
            .map(|home| vec![PathBuf::from(home).join(".config/launch_daemon")])
            .unwrap_or_default(),
    }
}

impl Settings {
    /// Merge one parsed file. Later definitions replace earlier ones.
    pub fn merge(&mut self, file: SettingsFile) {
        if let Some(section) = &file.daemon {
            match DaemonSettings::try_from(section) {
                Ok(daemon) => self.daemon = daemon,
                Err(err) => warn!(error = %err, "ignoring [daemon] section"),
            }
        }

        for target in &file.target {
            if let Err(err) = self.merge_target(target) {
                warn!(target = %target.name, error = %err, "skipping target");
            }
        }

        for (configs, service) in [(&file.job, false), (&file.service, true)] {
            for config in configs {
                self.add_job(config, service, None);
            }
        }

        for run in &file.run {
            match run_directive(run) {
                Ok(directive) => self.run.push(directive),
                Err(err) => warn!(error = %err, "skipping run directive"),
            }
        }
    }

    fn merge_target(&mut self, config: &TargetConfig) -> Result<()> {
        let name = non_empty_name(&config.name)?;

        let mut base = BaseJob::new(name.clone());
        base.condition = match &config.condition {
            Some(value) => Some(condition_from_value(value)?),
            None => None,
        };
        if config.no_safemode {
            base.condition = Some(add_not_safemode(base.condition.take()));
        }
        base.event = match &config.on {
            Some(value) => Some(event_from_value(value)?),
            None => None,
        };
        if let Some(env) = &config.env {
            apply_environment(&mut base, env)?;
        }

        if config.reset {
            let before = self.jobs.len();
            self.jobs
                .retain(|_, job| job.target.as_ref() != Some(&name));
            debug!(target = %name, removed = before - self.jobs.len(), "target reset");
        }

        match self.targets.get_mut(&name) {
            Some(existing) => {
                if base.condition.is_some() {
                    existing.base.condition = base.condition;
                }
                if base.event.is_some() {
                    existing.base.event = base.event;
                }
                existing.base.environment.extend(base.environment);
                existing.base.source_files.extend(base.source_files);
            }
            None => {
                let mut target = Target::new(name.clone());
                target.base = base;
                self.targets.insert(name.clone(), target);
            }
        }

        for (configs, service) in [(&config.job, false), (&config.service, true)] {
            for job in configs {
                self.add_job(job, service, Some(&name));
            }
        }
        Ok(())
    }

    fn add_job(&mut self, config: &JobConfig, service: bool, target: Option<&NameKey>) {
        match build_job(config, service, target) {
            Ok(job) => {
                if self.jobs.contains_key(job.name()) {
                    debug!(job = %job.name(), "replacing earlier job definition");
                }
                self.jobs.insert(job.name().clone(), job);
            }
            Err(err) => warn!(job = %config.name, error = %err, "skipping job"),
        }
    }
}

/// Compile a `[[job]]`/`[[service]]` entry.
pub fn build_job(config: &JobConfig, service: bool, target: Option<&NameKey>) -> Result<Job> {
    let mut job = Job::new(non_empty_name(&config.name)?);
    job.set_service(service);
    job.set_enabled(!config.disabled);
    job.legacy = config.legacy.unwrap_or(!service);
    job.arguments = config.launch.clone();
    job.requirements = config
        .requires
        .iter()
        .filter(|r| !r.is_empty())
        .map(NameKey::from)
        .collect();
    job.target = target.cloned();
    job.ports = config.port.clone();

    job.base.condition = match &config.condition {
        Some(value) => Some(condition_from_value(value)?),
        None => None,
    };
    if config.no_safemode {
        job.base.condition = Some(add_not_safemode(job.base.condition.take()));
    }

    job.base.event = match &config.on {
        Some(value) => Some(event_from_value(value)?),
        None => None,
    };
    if config.on_demand {
        job.base.event = Some(add_on_demand(job.base.event.take()));
    }

    if let Some(env) = &config.env {
        apply_environment(&mut job.base, env)?;
    }
    Ok(job)
}

fn apply_environment(base: &mut BaseJob, env: &Table) -> Result<()> {
    for (key, value) in env {
        if key == "from_script" {
            match value {
                Value::String(path) => base.source_files.push(PathBuf::from(path)),
                Value::Array(paths) => {
                    for path in paths {
                        let Value::String(path) = path else {
                            return Err(LaunchError::Config(format!(
                                "from_script entries must be strings, got {path}"
                            )));
                        };
                        base.source_files.push(PathBuf::from(path));
                    }
                }
                other => {
                    return Err(LaunchError::Config(format!(
                        "invalid from_script value: {other}"
                    )));
                }
            }
            continue;
        }

        let value = match value {
            Value::String(s) => s.clone(),
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => value.to_string(),
            other => {
                return Err(LaunchError::Config(format!(
                    "environment variable '{key}' must be a scalar, got {}",
                    other.type_str()
                )));
            }
        };
        base.environment.insert(key.clone(), value);
    }
    Ok(())
}

fn run_directive(run: &RunConfig) -> Result<RunDirective> {
    let condition = match &run.condition {
        Some(value) => Some(condition_from_value(value)?),
        None => None,
    };

    let mut then: Vec<NameKey> = run.target.iter().map(NameKey::from).collect();
    then.extend(run.then.iter().map(NameKey::from));
    let otherwise: Vec<NameKey> = run.otherwise.iter().map(NameKey::from).collect();

    if then.is_empty() && otherwise.is_empty() {
        return Err(LaunchError::Config(
            "run directive names no target".to_string(),
        ));
    }
    Ok(RunDirective {
        condition,
        then,
        otherwise,
    })
}

fn non_empty_name(name: &str) -> Result<NameKey> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LaunchError::Config("missing name".to_string()));
    }
    Ok(NameKey::from(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::fs::mock::MockFileSystem;

    fn job_config(source: &str) -> JobConfig {
        toml::from_str(source).unwrap()
    }

    #[test]
    fn no_safemode_wraps_existing_condition() {
        let config = job_config(
            r#"
            name = "indexer"
            no_safemode = true
            if = { file_exists = ["/boot/home"] }
            "#,
        );
        let job = build_job(&config, false, None).unwrap();
        assert_eq!(
            job.base.condition,
            Some(Condition::And(vec![
                Condition::FileExists(vec![PathBuf::from("/boot/home")]),
                Condition::Not(vec![Condition::Safemode]),
            ]))
        );
    }

    #[test]
    fn environment_accepts_scalars_and_scripts() {
        let config = job_config(
            r#"
            name = "mail"
            env = { LANG = "C", RETRIES = 3, from_script = ["/etc/profile"] }
            "#,
        );
        let job = build_job(&config, true, None).unwrap();
        assert!(!job.legacy);
        assert_eq!(job.base.environment["RETRIES"], "3");
        assert_eq!(job.base.source_files, vec![PathBuf::from("/etc/profile")]);

        let nested = job_config(
            r#"
            name = "mail"
            env = { BAD = ["x"] }
            "#,
        );
        assert!(build_job(&nested, false, None).is_err());
    }

    #[test]
    fn directory_listing_skips_other_files() {
        let fs = MockFileSystem::new();
        fs.add_file("/etc/launch_daemon/b.toml", "");
        fs.add_file("/etc/launch_daemon/a.toml", "");
        fs.add_file("/etc/launch_daemon/README", "");

        let files = collect_files(&fs, Path::new("/etc/launch_daemon"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/etc/launch_daemon/a.toml"),
                PathBuf::from("/etc/launch_daemon/b.toml"),
            ]
        );
    }

    #[test]
    fn run_directive_needs_a_target() {
        assert!(run_directive(&RunConfig::default()).is_err());
    }

    #[test]
    fn requirement_and_run_names_are_keys() {
        let config = job_config(
            r#"
            name = "deskbar"
            requires = ["Tracker", "", "desktop"]
            "#,
        );
        let job = build_job(&config, false, None).unwrap();
        assert_eq!(
            job.requirements,
            vec![NameKey::from("tracker"), NameKey::from("desktop")]
        );

        let run: RunConfig = toml::from_str(
            r#"
            target = "desktop"
            then = ["login"]
            else = ["safe"]
            "#,
        )
        .unwrap();
        let directive = run_directive(&run).unwrap();
        assert_eq!(
            directive.then,
            vec![NameKey::from("desktop"), NameKey::from("login")]
        );
        assert_eq!(directive.otherwise, vec![NameKey::from("safe")]);
    }
}
