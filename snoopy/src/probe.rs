//! Loading and attaching the exec tracepoints, and turning their perf
//! buffers into [`SourceStream`]s.

use std::path::Path;

use aya::Ebpf;
use aya::maps::perf::AsyncPerfEventArrayBuffer;
use aya::maps::{AsyncPerfEventArray, HashMap, MapData};
use aya::programs::TracePoint;
use aya::util::online_cpus;
use bytes::{Bytes, BytesMut};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use snoopy_common::{
    CONFIG_MAX_ARG, CONFIG_MAX_ENV, MAP_CONFIG, MAP_EXECVE_OUT, MAP_EXECVEAT_OUT,
};

use crate::config::SnoopyConfig;
use crate::error::ProbeError;
use crate::mux::{SourceFeed, SourceStream};

const PROGRAMS: [&str; 4] = [
    "sys_enter_execve",
    "sys_exit_execve",
    "sys_enter_execveat",
    "sys_exit_execveat",
];

/// Perf map name and the source name its records are reported under.
const SOURCES: [(&str, &str); 2] = [(MAP_EXECVE_OUT, "execve"), (MAP_EXECVEAT_OUT, "execveat")];

/// Raw records buffered per source between the perf readers and the worker.
const RECORD_QUEUE: usize = 300;
const READ_BUFFERS: usize = 10;
const READ_BUFFER_SIZE: usize = 1024;

/// Loaded and attached exec probes. Dropping it detaches everything.
pub struct ExecProbe {
    ebpf: Ebpf,
}

impl ExecProbe {
    /// Load the object at `path`, push the producer bounds into its config
    /// map and attach all four tracepoints.
    pub fn load(path: &Path, config: &SnoopyConfig) -> Result<Self, ProbeError> {
        let mut ebpf = Ebpf::load_file(path).map_err(|source| ProbeError::Load {
            path: path.to_owned(),
            source,
        })?;
        if let Err(e) = aya_log::EbpfLogger::init(&mut ebpf) {
            // This can happen if you remove all log statements from your eBPF program.
            warn!("failed to initialize eBPF logger: {e}");
        }

        {
            let map = ebpf
                .map_mut(MAP_CONFIG)
                .ok_or(ProbeError::MissingMap(MAP_CONFIG))?;
            let mut settings: HashMap<_, u32, u32> = HashMap::try_from(map)?;
            settings.insert(CONFIG_MAX_ARG, config.max_args, 0)?;
            settings.insert(CONFIG_MAX_ENV, config.max_envs, 0)?;
        }

        for name in PROGRAMS {
            let attach_err = |source| ProbeError::Attach { name, source };
            let program: &mut TracePoint = ebpf
                .program_mut(name)
                .ok_or(ProbeError::MissingProgram(name))?
                .try_into()
                .map_err(attach_err)?;
            program.load().map_err(attach_err)?;
            program.attach("syscalls", name).map_err(attach_err)?;
            debug!(tracepoint = name, "attached");
        }

        info!(
            object = %path.display(),
            max_args = config.max_args,
            max_envs = config.max_envs,
            "eBPF program loaded and attached"
        );
        Ok(Self { ebpf })
    }

    /// One stream per instrumented syscall. Readers stop on `cancel` or once
    /// the stream's worker is gone.
    pub fn open_sources(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceStream>, ProbeError> {
        let cpus =
            online_cpus().map_err(|(context, source)| ProbeError::OnlineCpus { context, source })?;

        let mut streams = Vec::with_capacity(SOURCES.len());
        for (map_name, source) in SOURCES {
            let map = self
                .ebpf
                .take_map(map_name)
                .ok_or(ProbeError::MissingMap(map_name))?;
            let mut perf = AsyncPerfEventArray::try_from(map)?;
            let (feed, stream) = SourceStream::channel(source, RECORD_QUEUE);
            for &cpu in &cpus {
                let buf = perf.open(cpu, None)?;
                tokio::spawn(read_cpu(source, cpu, buf, feed.clone(), cancel.clone()));
            }
            streams.push(stream);
        }
        Ok(streams)
    }
}

async fn read_cpu(
    source: &'static str,
    cpu: u32,
    mut buf: AsyncPerfEventArrayBuffer<MapData>,
    feed: SourceFeed,
    cancel: CancellationToken,
) {
    let mut buffers = (0..READ_BUFFERS)
        .map(|_| BytesMut::with_capacity(READ_BUFFER_SIZE))
        .collect::<Vec<_>>();

    loop {
        let events = tokio::select! {
            _ = cancel.cancelled() => break,
            events = buf.read_events(&mut buffers) => events,
        };
        match events {
            Ok(events) => {
                if events.lost > 0 && !feed.lost(events.lost as u64).await {
                    break;
                }
                for raw in buffers.iter().take(events.read) {
                    if !feed.record(Bytes::copy_from_slice(raw)).await {
                        return;
                    }
                }
            }
            Err(err) => {
                error!(source, cpu, "error reading perf buffer: {err}");
                break;
            }
        }
    }
    debug!(source, cpu, "perf reader stopped");
}

/// Bump the memlock rlimit. This is needed for older kernels that don't use the
/// new memcg based accounting, see https://lwn.net/Articles/837122/
pub fn raise_memlock_rlimit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        warn!("remove limit on locked memory failed, ret is: {ret}");
    }
}
