//! 启动横幅：局域网地址、终端二维码与等待提示。

use qrcode::render::unicode::Dense1x2;
use qrcode::{EcLevel, QrCode};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::warn;

/// 运行模式，决定横幅中的提示语。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Receive,
    Share,
}

/// 本机在局域网中的 IPv4 地址，找不到时回退到 `localhost`。
///
/// 先通过对外 UDP `connect` 让系统路由表选出出口地址（不会实际发送数据）；
/// 没有默认路由的离线局域网里再逐个检查网卡，常见物理网卡优先。
pub fn local_ip() -> String {
    match routed_ipv4().or_else(interface_ipv4) {
        Some(ip) => ip.to_string(),
        None => {
            warn!("could not determine local IP, falling back to localhost");
            "localhost".to_string()
        }
    }
}

fn routed_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if is_lan_candidate(ip) => Some(ip),
        _ => None,
    }
}

fn interface_ipv4() -> Option<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(err) => {
            warn!(error = %err, "failed to list network interfaces");
            return None;
        }
    };
    let candidates = interfaces
        .iter()
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) => Some((iface.name.as_str(), ip)),
            IpAddr::V6(_) => None,
        })
        .collect::<Vec<_>>();
    pick_interface_ip(&candidates)
}

/// 在 (网卡名, 地址) 中挑选：先按 [`PREFERRED_INTERFACES`] 顺序，再取第一个可用地址。
fn pick_interface_ip(candidates: &[(&str, Ipv4Addr)]) -> Option<Ipv4Addr> {
    let usable = |ip: &Ipv4Addr| is_lan_candidate(*ip) && !is_virtual_adapter(*ip);
    PREFERRED_INTERFACES
        .iter()
        .find_map(|preferred| {
            candidates
                .iter()
                .find(|(name, ip)| name == preferred && usable(ip))
                .map(|(_, ip)| *ip)
        })
        .or_else(|| {
            candidates
                .iter()
                .map(|(_, ip)| *ip)
                .find(|ip| usable(ip))
        })
}

const PREFERRED_INTERFACES: [&str; 4] = ["en0", "en1", "eth0", "wlan0"];

fn is_lan_candidate(ip: Ipv4Addr) -> bool {
    !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified()
}

/// VMware NAT（192.168.176.0/24）与 VirtualBox host-only（192.168.224.0/24）网段。
fn is_virtual_adapter(ip: Ipv4Addr) -> bool {
    matches!(ip.octets(), [192, 168, 176, _] | [192, 168, 224, _])
}

pub fn server_url(host: &str, port: u16) -> String {
    format!("http://{host}:{port}")
}

/// 终端半块字符二维码。
pub fn render_qr(url: &str) -> Option<String> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::L)
        .map_err(|err| warn!(error = %err, "failed to build QR code"))
        .ok()?;
    Some(
        code.render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
    )
}

/// 监听成功后打印访问方式。
pub fn print_banner(url: &str, mode: Mode) {
    println!();
    println!("✓ Server started successfully!");
    println!();
    match mode {
        Mode::Receive => println!("📱 Scan QR code to upload files:"),
        Mode::Share => println!("📱 Scan QR code or use the URL below:"),
    }
    println!();
    if let Some(qr) = render_qr(url) {
        println!("{qr}");
        println!();
    }
    println!("🌐  URL: {url}");
    println!();
    match mode {
        Mode::Receive => println!("📥 Waiting for uploads... Press Ctrl+C to stop"),
        Mode::Share => println!("📡 Waiting for connections... Press Ctrl+C to stop"),
    }
    println!();
}
