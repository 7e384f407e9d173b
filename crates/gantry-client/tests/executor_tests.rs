//! 航点执行器集成测试
//!
//! 使用仿真电机驱动完整流程：配置 → 忙等执行 → 释放 → 后处理。

use gantry_client::{
    CraneBuilder, ExecutorConfig, ExecutorError, ExecutorState, Waypoint, WaypointExecutor,
};
use gantry_driver::{
    AxisId, ChannelSensorLink, MAX_ACCEL_LIMIT, MachineState, MotorCommand, MotorMode,
    SensorFeed, SimulatedMotor,
};
use gantry_protocol::SensorFrame;
use gantry_tools::CraneConfig;
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Rig {
    machine: Arc<MachineState>,
    cart: SimulatedMotor,
    hoist: SimulatedMotor,
    feed: SensorFeed,
}

fn rig() -> Rig {
    let cart = SimulatedMotor::new(65536);
    let hoist = SimulatedMotor::new(65536);
    let (link, feed) = ChannelSensorLink::new();
    let machine = CraneBuilder::new(CraneConfig::default())
        .cart_driver(Box::new(cart.clone()))
        .hoist_driver(Box::new(hoist.clone()))
        .sensor_link(Box::new(link))
        .build()
        .unwrap();
    Rig {
        machine,
        cart,
        hoist,
        feed,
    }
}

fn three_point() -> Vec<Waypoint> {
    vec![
        Waypoint::new(0.0, 0.0, 0.0),
        Waypoint::new(0.5, 100.0, 200.0),
        Waypoint::new(1.0, 200.0, 0.0),
    ]
}

#[test]
#[serial]
fn test_three_waypoint_trajectory() {
    let rig = rig();
    rig.feed.push_frame(SensorFrame::new(0.806 * 5.0, 0.0, 2.5));

    let executor = WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default());
    let trajectory = executor.execute(&three_point()).unwrap();

    assert_eq!(executor.state(), ExecutorState::Complete);
    assert_eq!(trajectory.len(), 3);

    let rows = trajectory.samples();
    // 首行是执行前的起点
    assert_eq!(rows[0].t, 0.0);
    assert_eq!(rows[0].x, 0.0);
    assert_eq!(rows[0].v, 0.0);

    // 每行都不早于对应航点的调度时刻
    assert!(rows[1].t >= 0.5, "t1 = {}", rows[1].t);
    assert!(rows[2].t >= 1.0, "t2 = {}", rows[2].t);
    assert!(rows[2].t < 1.1, "t2 = {}", rows[2].t);

    // 200 mm/s 跑 0.5 s 约 100 mm
    assert!((rows[1].x - 0.1).abs() < 0.01, "x1 = {}", rows[1].x);
    assert!((rows[1].v - 0.2).abs() < 1e-9, "v1 = {}", rows[1].v);
    assert!((rows[2].x - 0.2).abs() < 0.01, "x2 = {}", rows[2].x);
    assert_eq!(rows[2].v, 0.0);

    // 传感器读数经过角度标定（安装方向翻转）
    assert!((rows[1].theta + 5f64.to_radians()).abs() < 1e-6);
    assert_eq!(rows[1].wind_speed, 2.5);

    // 时间戳已取整到微秒
    for row in rows {
        assert_eq!(row.t, (row.t * 1e6).round() / 1e6);
    }
}

#[test]
#[serial]
fn test_command_sequence() {
    let rig = rig();
    let executor = WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default());
    executor.execute(&three_point()).unwrap();

    let commands: Vec<MotorCommand> = rig.cart.commands().into_iter().map(|(_, c)| c).collect();
    assert_eq!(
        commands,
        vec![
            MotorCommand::SetMode(MotorMode::Position),
            MotorCommand::AccelLimit(MAX_ACCEL_LIMIT),
            MotorCommand::VelocityLimit(300),
            MotorCommand::PositionTarget(327_680),
            MotorCommand::VelocityLimit(300),
            MotorCommand::VelocityLimit(0),
            MotorCommand::SetMode(MotorMode::Torque),
            MotorCommand::TorqueTarget(0),
        ]
    );

    // 位置目标只下发一次
    let targets = commands
        .iter()
        .filter(|c| matches!(c, MotorCommand::PositionTarget(_)))
        .count();
    assert_eq!(targets, 1);

    // 卷扬从未收到命令
    assert!(rig.hoist.commands().is_empty());
}

#[test]
#[serial]
fn test_velocity_limit_updates_follow_schedule() {
    let rig = rig();
    let executor = WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default());

    let start = Instant::now();
    executor
        .execute(&[
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(0.1, 5.0, 50.0),
            Waypoint::new(0.2, 10.0, 100.0),
            Waypoint::new(0.3, 15.0, 0.0),
        ])
        .unwrap();

    let limit_times: Vec<f64> = rig
        .cart
        .commands()
        .into_iter()
        .filter(|(_, c)| matches!(c, MotorCommand::VelocityLimit(_)))
        .map(|(at, _)| at.duration_since(start).as_secs_f64())
        .collect();

    // 配置时一次 + 每个后续航点一次
    assert_eq!(limit_times.len(), 4);
    for (i, scheduled) in [0.1, 0.2, 0.3].iter().enumerate() {
        let at = limit_times[i + 1];
        assert!(at >= *scheduled, "update {} at {} < {}", i, at, scheduled);
    }
}

#[test]
#[serial]
fn test_hoist_axis_and_custom_accel() {
    let rig = rig();
    let config = ExecutorConfig {
        driven_axis: AxisId::Hoist,
        max_acceleration: 5000,
    };
    let executor = WaypointExecutor::new(rig.machine.clone(), config);
    let trajectory = executor
        .execute(&[Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(0.05, 1.0, 0.0)])
        .unwrap();

    assert_eq!(trajectory.len(), 2);
    assert_eq!(rig.hoist.accel_limit(), 5000);
    assert_eq!(rig.hoist.mode(), MotorMode::Torque);
    assert!(rig.cart.commands().is_empty());
}

#[test]
#[serial]
fn test_invalid_trajectory_sends_nothing() {
    let rig = rig();
    let executor = WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default());

    let err = executor.execute(&[Waypoint::new(0.0, 0.0, 0.0)]).unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidTrajectory(_)));
    assert!(rig.cart.commands().is_empty());
    assert_eq!(executor.state(), ExecutorState::Idle);
}

#[test]
#[serial]
fn test_driver_failure_aborts() {
    let rig = rig();
    rig.cart.set_failing(true);

    let executor = WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default());
    let err = executor.execute(&three_point()).unwrap_err();

    assert!(matches!(err, ExecutorError::Driver(_)));
    assert!(err.is_fatal());
    assert_eq!(executor.state(), ExecutorState::Aborted);
}

#[test]
#[serial]
fn test_failure_mid_trajectory_aborts() {
    let rig = rig();
    let executor = WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default());

    let cart = rig.cart.clone();
    let injector = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        cart.set_failing(true);
    });

    let err = executor.execute(&three_point()).unwrap_err();
    injector.join().unwrap();

    match err {
        ExecutorError::Driver(e) => assert_eq!(e.axis_id(), AxisId::Cart),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(executor.state(), ExecutorState::Aborted);
}

#[test]
#[serial]
fn test_cancel_releases_axis() {
    let rig = rig();
    let executor = Arc::new(WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default()));
    let token = executor.cancel_token();

    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        token.cancel();
    });

    let start = Instant::now();
    let err = executor.execute(&three_point()).unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, ExecutorError::Cancelled));
    assert!(start.elapsed() < Duration::from_millis(450));
    assert_eq!(executor.state(), ExecutorState::Aborted);
    assert_eq!(rig.cart.mode(), MotorMode::Torque);
    assert_eq!(rig.cart.last_command(), Some(MotorCommand::TorqueTarget(0)));

    // 下一次执行会清除取消标志
    let trajectory = executor
        .execute(&[Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(0.01, 0.0, 0.0)])
        .unwrap();
    assert_eq!(trajectory.len(), 2);
}

#[test]
#[serial]
fn test_concurrent_execute_rejected() {
    let rig = rig();
    let executor = Arc::new(WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default()));

    let background = {
        let executor = Arc::clone(&executor);
        thread::spawn(move || executor.execute(&three_point()))
    };

    let deadline = Instant::now() + Duration::from_secs(1);
    while !executor.state().is_active() {
        assert!(Instant::now() < deadline, "executor never started");
        thread::yield_now();
    }

    let err = executor.execute(&three_point()).unwrap_err();
    assert!(matches!(err, ExecutorError::AlreadyRunning));

    executor.cancel_token().cancel();
    let result = background.join().unwrap();
    assert!(matches!(result, Err(ExecutorError::Cancelled)));
}

#[test]
#[serial]
fn test_zero_duration_waypoints_dedup() {
    let rig = rig();
    let executor = WaypointExecutor::new(rig.machine.clone(), ExecutorConfig::default());

    // 两个 t = 0 的航点：第二行的实测时间可能落在同一微秒，也可能稍晚
    let trajectory = executor
        .execute(&[
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(0.02, 0.0, 0.0),
        ])
        .unwrap();

    let times = trajectory.times();
    assert!(times.len() == 2 || times.len() == 3);
    assert!(times.windows(2).all(|w| w[0] < w[1]), "{:?}", times);
}
