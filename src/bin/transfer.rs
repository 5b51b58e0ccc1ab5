//! 单连接传输实验
//!
//! 客户端经过一条不可靠信道（时延/抖动/丢包/比特翻转/复制）向服务端发送数据，
//! 服务端吸收或回显；结束后校验两端重建的字节流。

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use minitcp_rs::config::TransferConfig;
use minitcp_rs::net::{NetWorld, Network};
use minitcp_rs::scenario::{ServerApp, TransferOpts, build_transfer, pattern_bytes};
use minitcp_rs::sim::{SimTime, Simulator};
use minitcp_rs::trace::TraceLogger;

#[derive(Debug, Parser)]
#[command(name = "transfer", about = "不可靠信道上的单连接 TCP 传输")]
struct Args {
    /// JSON 配置文件；命令行参数覆盖其中的同名字段
    #[arg(long)]
    config: Option<PathBuf>,

    /// 客户端发送的数据量（字节）
    #[arg(long)]
    data_bytes: Option<u64>,

    /// 服务端回显收到的数据
    #[arg(long)]
    echo: bool,

    /// MSS（字节）
    #[arg(long)]
    mss: Option<usize>,

    /// 初始发送窗口（单位：MSS 个数）
    #[arg(long)]
    init_window_segments: Option<u32>,

    /// 初始 RTO（毫秒）
    #[arg(long)]
    rto_ms: Option<u64>,

    /// 最小 RTO（毫秒）
    #[arg(long)]
    min_rto_ms: Option<u64>,

    /// 最大 RTO（毫秒）
    #[arg(long)]
    max_rto_ms: Option<u64>,

    /// 单向传播时延（微秒）
    #[arg(long)]
    latency_us: Option<u64>,

    /// 随机抖动上限（微秒）；非零会造成乱序
    #[arg(long)]
    jitter_us: Option<u64>,

    /// 丢包概率
    #[arg(long)]
    loss: Option<f64>,

    /// 比特翻转概率
    #[arg(long)]
    corrupt: Option<f64>,

    /// 复制概率
    #[arg(long)]
    duplicate: Option<f64>,

    /// 信道随机数种子
    #[arg(long)]
    seed: Option<u64>,

    /// 仿真运行到多少毫秒
    #[arg(long)]
    until_ms: Option<u64>,

    /// 输出 JSON 事件文件；不填则不生成
    #[arg(long)]
    trace_json: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut TransferConfig) {
        fn set<T: Copy>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }
        set(&mut cfg.transfer.data_bytes, self.data_bytes);
        set(&mut cfg.transfer.until_ms, self.until_ms);
        if self.echo {
            cfg.transfer.echo = true;
        }
        set(&mut cfg.tcp.mss, self.mss);
        set(&mut cfg.tcp.init_window_segments, self.init_window_segments);
        set(&mut cfg.tcp.init_rto_ms, self.rto_ms);
        set(&mut cfg.tcp.min_rto_ms, self.min_rto_ms);
        set(&mut cfg.tcp.max_rto_ms, self.max_rto_ms);
        set(&mut cfg.channel.latency_us, self.latency_us);
        set(&mut cfg.channel.jitter_us, self.jitter_us);
        set(&mut cfg.channel.loss, self.loss);
        set(&mut cfg.channel.corrupt, self.corrupt);
        set(&mut cfg.channel.duplicate, self.duplicate);
        set(&mut cfg.channel.seed, self.seed);
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut cfg = match args.config.as_deref() {
        Some(path) => match TransferConfig::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
        },
        None => TransferConfig::default(),
    };
    args.apply(&mut cfg);
    if let Err(e) = cfg.validate() {
        eprintln!("error: {e}");
        return ExitCode::from(2);
    }

    let mut network = Network::new(cfg.channel_config());
    if args.trace_json.is_some() {
        network.trace = Some(TraceLogger::default());
    }

    let payload = pattern_bytes(cfg.transfer.data_bytes as usize);
    let opts = TransferOpts {
        tcp: cfg.tcp_config(),
        app: if cfg.transfer.echo {
            ServerApp::Echo
        } else {
            ServerApp::Sink
        },
        payload,
    };

    let mut sim = Simulator::default();
    let mut world = NetWorld::new(network);
    let t = build_transfer(&mut sim, &mut world, &opts);

    sim.run_until(SimTime::from_millis(cfg.transfer.until_ms), &mut world);

    if let Some(path) = args.trace_json.as_ref() {
        if let Some(logger) = world.net.trace.take() {
            let written = serde_json::to_string_pretty(&logger.events)
                .map_err(|e| e.to_string())
                .and_then(|json| fs::write(path, json).map_err(|e| e.to_string()));
            match written {
                Ok(()) => eprintln!("wrote trace events to {}", path.display()),
                Err(e) => {
                    eprintln!("error: writing {}: {e}", path.display());
                    return ExitCode::from(2);
                }
            }
        }
    }

    let server_rx = t.server_rx.borrow();
    let client_rx = t.client_rx.borrow();
    let mut ok = server_rx.data == opts.payload;
    if opts.app == ServerApp::Echo {
        ok &= client_rx.data == opts.payload;
    }

    let (retransmissions, timeouts, rtt_samples) = world
        .client
        .as_ref()
        .and_then(|c| c.connection())
        .map(|c| {
            let s = c.stats();
            (s.retransmissions, s.timeouts, s.rtt_samples)
        })
        .unwrap_or_default();
    let syn_sent = world.client.as_ref().map_or(0, |c| c.stats.syn_sent);
    let stats = &world.net.stats;

    println!(
        "done @ {}\n  app: delivered_ok={}, sent_bytes={}, server_received={}, server_eof={}, client_received={}\n  tcp: syn_sent={}, retransmissions={}, timeouts={}, rtt_samples={}\n  net: sent={}, delivered={}, dropped={}, corrupted={}, duplicated={}",
        sim.now(),
        ok,
        opts.payload.len(),
        server_rx.data.len(),
        server_rx.eof,
        client_rx.data.len(),
        syn_sent,
        retransmissions,
        timeouts,
        rtt_samples,
        stats.sent_segments,
        stats.delivered_segments,
        stats.dropped_segments,
        stats.corrupted_segments,
        stats.duplicated_segments,
    );

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
