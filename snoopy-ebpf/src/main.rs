#![no_std]
#![no_main]

use aya_ebpf::{
    helpers::{
        bpf_get_current_comm, bpf_get_current_pid_tgid, bpf_get_current_uid_gid,
        bpf_ktime_get_ns, bpf_probe_read_user, bpf_probe_read_user_str_bytes,
    },
    macros::{map, tracepoint},
    maps::{HashMap, PerCpuArray, PerfEventByteArray},
    programs::TracePointContext,
};
use aya_log_ebpf::debug;
use snoopy_common::{
    CONFIG_LIMIT, CONFIG_MAX_ARG, CONFIG_MAX_ENV, HEADER_LEN, PAYLOAD_LEN, RECORD_ARG,
    RECORD_ENV, RECORD_RET, Record,
};

// Field offsets in the syscalls:sys_{enter,exit}_execve(at) tracepoint formats.
const EXIT_RET_OFFSET: usize = 16;

struct EnterLayout {
    filename: usize,
    argv: usize,
    envp: usize,
}

const EXECVE: EnterLayout = EnterLayout {
    filename: 16,
    argv: 24,
    envp: 32,
};

// execveat has the dirfd in front of the filename.
const EXECVEAT: EnterLayout = EnterLayout {
    filename: 24,
    argv: 32,
    envp: 40,
};

#[map(name = "CONFIG_MAP")]
static CONFIG_MAP: HashMap<u32, u32> = HashMap::with_max_entries(2, 0);

#[map(name = "EXECVE_OUT")]
static EXECVE_OUT: PerfEventByteArray = PerfEventByteArray::new(0);

#[map(name = "EXECVEAT_OUT")]
static EXECVEAT_OUT: PerfEventByteArray = PerfEventByteArray::new(0);

#[map]
static SCRATCH: PerCpuArray<Record> = PerCpuArray::with_max_entries(1, 0);

#[tracepoint]
pub fn sys_enter_execve(ctx: TracePointContext) -> u32 {
    if let Err(err) = try_enter(&ctx, &EXECVE_OUT, &EXECVE) {
        debug!(&ctx, "execve enter fragment dropped: {}", err);
    }
    0
}

#[tracepoint]
pub fn sys_exit_execve(ctx: TracePointContext) -> u32 {
    if let Err(err) = try_exit(&ctx, &EXECVE_OUT) {
        debug!(&ctx, "execve exit fragment dropped: {}", err);
    }
    0
}

#[tracepoint]
pub fn sys_enter_execveat(ctx: TracePointContext) -> u32 {
    if let Err(err) = try_enter(&ctx, &EXECVEAT_OUT, &EXECVEAT) {
        debug!(&ctx, "execveat enter fragment dropped: {}", err);
    }
    0
}

#[tracepoint]
pub fn sys_exit_execveat(ctx: TracePointContext) -> u32 {
    if let Err(err) = try_exit(&ctx, &EXECVEAT_OUT) {
        debug!(&ctx, "execveat exit fragment dropped: {}", err);
    }
    0
}

/// Emits the filename, then up to `max_arg` entries of `argv[1..]` as Arg
/// fragments, then up to `max_env` entries of `envp` as Env fragments.
fn try_enter(
    ctx: &TracePointContext,
    out: &PerfEventByteArray,
    layout: &EnterLayout,
) -> Result<(), i64> {
    let max_arg = config(CONFIG_MAX_ARG) as usize;
    let max_env = config(CONFIG_MAX_ENV) as usize;

    let record = scratch()?;
    fill_header(record, RECORD_ARG, 0)?;

    let filename = unsafe { ctx.read_at::<*const u8>(layout.filename)? };
    emit_str(ctx, out, record, filename)?;

    let argv = unsafe { ctx.read_at::<*const *const u8>(layout.argv)? };
    if !argv.is_null() {
        for i in 1..=CONFIG_LIMIT as usize {
            if i > max_arg {
                break;
            }
            let arg = unsafe { bpf_probe_read_user(argv.add(i))? };
            if arg.is_null() {
                break;
            }
            emit_str(ctx, out, record, arg)?;
        }
    }

    if max_env == 0 {
        return Ok(());
    }
    record.header.kind = RECORD_ENV;
    let envp = unsafe { ctx.read_at::<*const *const u8>(layout.envp)? };
    if !envp.is_null() {
        for i in 0..CONFIG_LIMIT as usize {
            if i >= max_env {
                break;
            }
            let env = unsafe { bpf_probe_read_user(envp.add(i))? };
            if env.is_null() {
                break;
            }
            emit_str(ctx, out, record, env)?;
        }
    }
    Ok(())
}

fn try_exit(ctx: &TracePointContext, out: &PerfEventByteArray) -> Result<(), i64> {
    let ret = unsafe { ctx.read_at::<i64>(EXIT_RET_OFFSET)? };
    let record = scratch()?;
    fill_header(record, RECORD_RET, ret)?;
    out.output(ctx, record_bytes(record, HEADER_LEN), 0);
    Ok(())
}

fn config(key: u32) -> u32 {
    unsafe { CONFIG_MAP.get(&key) }.copied().unwrap_or(0)
}

fn scratch() -> Result<&'static mut Record, i64> {
    let ptr = SCRATCH.get_ptr_mut(0).ok_or(-1i64)?;
    Ok(unsafe { &mut *ptr })
}

fn fill_header(record: &mut Record, kind: u32, ret: i64) -> Result<(), i64> {
    let pid_tgid = bpf_get_current_pid_tgid();
    record.header.ts = unsafe { bpf_ktime_get_ns() };
    record.header.kind = kind;
    record.header.pid = (pid_tgid >> 32) as u32;
    record.header.tid = pid_tgid as u32;
    record.header.uid = bpf_get_current_uid_gid() as u32;
    record.header.ret = ret;
    record.header.comm = bpf_get_current_comm()?;
    Ok(())
}

/// Copies a user string into the payload and emits header plus string,
/// without the trailing NUL.
fn emit_str(
    ctx: &TracePointContext,
    out: &PerfEventByteArray,
    record: &mut Record,
    src: *const u8,
) -> Result<(), i64> {
    let len = unsafe { bpf_probe_read_user_str_bytes(src, &mut record.payload)? }.len();
    // Keeps the verifier convinced the size stays inside the scratch buffer.
    let len = len & (PAYLOAD_LEN - 1);
    out.output(ctx, record_bytes(record, HEADER_LEN + len), 0);
    Ok(())
}

fn record_bytes(record: &Record, len: usize) -> &[u8] {
    unsafe { core::slice::from_raw_parts(record as *const Record as *const u8, len) }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[unsafe(link_section = "license")]
#[unsafe(no_mangle)]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
