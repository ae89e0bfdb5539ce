#![doc = r#"
# spark-transport-udp

## 模块使命（Why）
- **统一 UDP 通路**：引导器在传输类型为 UDP 时分派到本 crate，取得 [`UdpServerFactory`]，
  由其产出围绕 Tokio `UdpSocket` 的 [`UdpReactor`]。
- **会话语义**：UDP 本身无连接，反应器以“对端地址”为键维护对端表，把首个报文视为连接建立，
  使上层回调与 TCP 保持同一套 `connect → receive → disconnect` 语义。

## 核心契约（What）
- 首次收到某对端的报文时依次触发 `on_connect` 与 `on_receive`，之后同一对端只触发 `on_receive`；
- `Connection::close` 将对端移出对端表并触发 `on_disconnect(LocalClosed)`，该对端的后续报文视为新连接；
- `Reactor::stop` 对仍在表中的对端触发 `on_disconnect(ReactorStopped)`；
- 约束：`start` 必须在 Tokio 运行时中调用。

## 实现策略（How）
- 绑定通过 `socket2` 完成，随后移交 Tokio；
- 接收循环独占读方向，所有连接句柄共享一条出站通道，由单个写任务按目的地址 `send_to`；
- 对端表以 `parking_lot::Mutex<HashMap>` 保护，临界区内不执行回调。

## 风险提示（Trade-offs）
- 对端表没有空闲淘汰，长时间运行且对端众多时需由业务侧主动 `close`；
- 单个报文超过 `buffer_bytes` 时按操作系统语义截断。
"#]

mod factory;
mod reactor;
mod socket;

pub use factory::UdpServerFactory;
pub use reactor::UdpReactor;
