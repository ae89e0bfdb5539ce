#![doc = r#"
# spark-transport-tcp

## 设计动机（Why）
- **定位**：引导器在传输类型为 TCP 时分派到本 crate，取得 [`TcpServerFactory`]；
  工厂随后可以在任意地址上产出互不影响的 [`TcpReactor`]。
- **架构角色**：只依赖 `spark-core` 的契约（[`ServerSettings`](spark_core::ServerSettings)、
  [`Reactor`](spark_core::Reactor)、[`Connection`](spark_core::Connection)），不感知引导器本身。

## 核心契约（What）
- **输入条件**：`start` 必须在 Tokio 运行时中调用，否则返回 `RuntimeUnavailable`；
- **回调语义**：每个入站连接依次触发 `on_connect`、零到多次 `on_receive`、恰好一次 `on_disconnect`；
- **关闭语义**：`Connection::close` 半关闭写方向，待对端关闭后以 `LocalClosed` 结束；
  `Reactor::stop` 以 `ReactorStopped` 结束所有存活连接，并在返回前等待回调派发完毕。

## 实现策略（How）
- **绑定**：通过 `socket2` 创建监听套接字，先应用 `SO_REUSEADDR`/`SO_SNDBUF` 再绑定，最后移交 Tokio；
- **连接**：每个连接拆分为读循环与写任务，写任务消费连接句柄的出站通道；
- **停止**：`watch` 通道广播停止信号，接受循环与所有连接任务据此退出。

## 风险与考量（Trade-offs）
- 出站通道无界，慢速对端会导致内存累积；
- 接受失败（如文件描述符耗尽）时短暂退避后重试，不会终止反应器。
"#]

mod factory;
mod reactor;
mod socket;

pub use factory::TcpServerFactory;
pub use reactor::TcpReactor;
