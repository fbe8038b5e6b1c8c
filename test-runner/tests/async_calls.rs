//! End-to-end async call scenarios driven through the host engine

use tos_program_runtime::{
    AsyncContext, AsyncEvent, CallArgsParser, CallDataCodec, CallType, Config, ContractCallInput, ContractError,
    CorrelationId, ReturnCode, TosVmError,
};
use tos_syscalls::{
    tos_create_async_call, tos_finish, tos_log, tos_set_async_context_callback, tos_set_async_group_callback,
    tos_transfer_value,
};
use tos_test_runner::{engine, init_logging, test_host, MockWorld};

const USER: [u8; 32] = [9u8; 32];
const A: [u8; 32] = [1u8; 32];
// Same partition as A out of two
const B: [u8; 32] = [3u8; 32];
// Other partition
const C: [u8; 32] = [2u8; 32];

const TRANSFER: &[u8] = b"TokenTransfer@544b4e@64";

fn call_b(host: &mut tos_program_runtime::InvokeContext, data: &[u8], limit: u64, locked: u64) -> Result<(), ContractError> {
    tos_create_async_call(host, b"g", &B, 0, data, b"onOk", b"onErr", limit, locked)?;
    Ok(())
}

#[test]
fn test_local_call_with_callback_conserves_gas() -> anyhow::Result<()> {
    init_logging();
    let world = MockWorld::new()
        .function(A, "main", |host, _| {
            call_b(host, b"ping@01", 1_000, 500)?;
            tos_finish(host, b"started")?;
            Ok(())
        })
        .function(B, "ping", |host, _| {
            tos_finish(host, b"pong")?;
            Ok(())
        })
        .function(A, "onOk", |host, _| {
            tos_finish(host, b"ok")?;
            Ok(())
        });
    let mut engine = engine(world);
    let (mut host, recorder) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    assert_eq!(output.return_code, ReturnCode::Ok);
    assert_eq!(
        output.return_data,
        vec![b"started".to_vec(), b"pong".to_vec(), b"ok".to_vec()]
    );
    // main 15, ping 10 step + 5, onOk 3; everything else flows back
    assert_eq!(output.gas_remaining, 10_000 - 33);

    let world = engine.executor();
    let ping = world.calls_to("ping")[0];
    assert_eq!(ping.caller, A);
    assert_eq!(ping.gas_provided, 990);
    assert_eq!(ping.gas_locked, 500);
    assert_eq!(ping.call_type, CallType::AsynchronousCall);
    assert_eq!(ping.arguments.len(), 2);
    assert_eq!(ping.arguments[1], vec![1]);

    let on_ok = world.calls_to("onOk")[0];
    assert_eq!(on_ok.caller, B);
    assert_eq!(on_ok.arguments, vec![Vec::new(), b"pong".to_vec()]);
    // 975 left by ping + 500 locked - (10 step + 14 bytes of "onOk@@706f6e67")
    assert_eq!(on_ok.gas_provided, 1_451);
    assert_eq!(on_ok.call_type, CallType::AsynchronousCallBack);
    assert!(!on_ok.return_call_after_error);

    assert!(recorder
        .events()
        .iter()
        .any(|event| matches!(event, AsyncEvent::ContextFinalized { owner, .. } if *owner == A)));
    Ok(())
}

#[test]
fn test_failed_destination_runs_error_callback() -> anyhow::Result<()> {
    let world = MockWorld::new()
        .function(A, "main", |host, _| call_b(host, b"ping", 1_000, 500))
        .function(B, "ping", |_, _| Err(ContractError::user("boom")))
        .noop(A, "onErr");
    let mut engine = engine(world);
    let (mut host, _) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    assert!(output.return_code.is_ok());
    // The failed destination forfeits its 990
    assert_eq!(output.gas_remaining, 10_000 - 4 - 990);

    let world = engine.executor();
    assert!(world.calls_to("onOk").is_empty());
    let on_err = world.calls_to("onErr")[0];
    assert_eq!(on_err.arguments, vec![vec![ReturnCode::UserError as u8], b"boom".to_vec()]);
    assert_eq!(on_err.gas_provided, 500 - 10 - 17);
    assert!(on_err.return_call_after_error);
    Ok(())
}

#[test]
fn test_destination_out_of_gas() -> anyhow::Result<()> {
    let world = MockWorld::new()
        .function(A, "main", |host, _| call_b(host, b"ping", 1_000, 500))
        .function(B, "ping", |host, _| {
            tos_log(host, &[b'x'; 1_000])?;
            Ok(())
        })
        .noop(A, "onErr");
    let mut engine = engine(world);
    let (mut host, _) = test_host(Config::test(), 2);

    engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    let on_err = engine.executor().calls_to("onErr")[0];
    assert_eq!(on_err.arguments[0], vec![ReturnCode::OutOfGas as u8]);
    assert_eq!(on_err.arguments[1], b"Out of compute units".to_vec());
    Ok(())
}

#[test]
fn test_value_sent_back_reaches_callback() -> anyhow::Result<()> {
    let world = MockWorld::new()
        .function(A, "main", |host, _| call_b(host, b"refund", 1_000, 500))
        .function(B, "refund", |host, _| {
            tos_transfer_value(host, &A, 42, b"")?;
            Ok(())
        })
        .noop(A, "onOk");
    let mut engine = engine(world);
    let (mut host, _) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    let refund = &output.output_accounts[&A].transfers[0];
    assert_eq!(refund.value, 42);
    assert_eq!(refund.sender, B);

    assert_eq!(engine.executor().calls_to("onOk")[0].call_value, 42);
    Ok(())
}

#[test]
fn test_transfer_without_callback_is_not_executed() -> anyhow::Result<()> {
    let world = MockWorld::new().function(A, "main", |host, _| {
        tos_create_async_call(host, b"g", &B, 0, TRANSFER, b"", b"", 1_000, 200)?;
        Ok(())
    });
    let mut engine = engine(world);
    let (mut host, recorder) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    assert_eq!(output.return_data, vec![TRANSFER.to_vec()]);
    // Only the data copy is charged; limit and lock come back
    assert_eq!(output.gas_remaining, 10_000 - TRANSFER.len() as u64);
    assert_eq!(engine.executor().calls().len(), 1);
    assert!(recorder
        .events()
        .iter()
        .any(|event| matches!(event, AsyncEvent::TransferResolved { .. })));
    Ok(())
}

#[test]
fn test_returned_transfer_carries_the_callback() -> anyhow::Result<()> {
    let world = MockWorld::new()
        .function(A, "main", |host, _| call_b(host, b"withdraw", 1_000, 500))
        .function(B, "withdraw", |host, _| {
            tos_finish(host, TRANSFER)?;
            Ok(())
        })
        .noop(A, "TokenTransfer");
    let mut engine = engine(world);
    let (mut host, _) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    // The transfer was consumed by the callback rather than returned
    assert!(output.return_data.is_empty());

    let world = engine.executor();
    assert!(world.calls_to("onOk").is_empty());
    let transfer = world.calls_to("TokenTransfer")[0];
    assert_eq!(transfer.caller, B);
    assert_eq!(transfer.recipient, A);
    assert_eq!(
        transfer.arguments,
        vec![b"TKN".to_vec(), vec![0x64], b"onOk".to_vec(), Vec::new()]
    );
    Ok(())
}

#[test]
fn test_group_and_context_callbacks_fire_once() -> anyhow::Result<()> {
    let world = MockWorld::new()
        .function(A, "main", |host, _| {
            for _ in 0..3 {
                tos_create_async_call(host, b"swap", &B, 0, b"ping", b"", b"", 1_000, 0)?;
            }
            tos_set_async_group_callback(host, b"swap", b"swapDone", b"ctx", 400)?;
            tos_set_async_context_callback(host, b"allDone", b"fin")?;
            Ok(())
        })
        .noop(B, "ping")
        .noop(A, "swapDone")
        .noop(A, "allDone");
    let mut engine = engine(world);
    let (mut host, _) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    // 12 + 3 + 3 bytes copied by main, one async step per ping
    assert_eq!(output.gas_remaining, 10_000 - 48);

    let world = engine.executor();
    let order: Vec<&str> = world.calls().iter().map(|input| input.function.as_str()).collect();
    assert_eq!(order, vec!["main", "ping", "ping", "ping", "swapDone", "allDone"]);

    let swap_done = world.calls_to("swapDone")[0];
    assert_eq!(swap_done.caller, USER);
    assert_eq!(swap_done.arguments, vec![b"ctx".to_vec()]);
    assert_eq!(swap_done.gas_provided, 400);

    let all_done = world.calls_to("allDone")[0];
    assert_eq!(all_done.arguments, vec![b"fin".to_vec()]);
    assert_eq!(all_done.gas_provided, 400);
    Ok(())
}

#[test]
fn test_call_depth_is_bounded() -> anyhow::Result<()> {
    fn recurse(host: &mut tos_program_runtime::InvokeContext, _: &ContractCallInput) -> Result<(), ContractError> {
        let limit = host.get_remaining() / 2;
        tos_create_async_call(host, b"r", &A, 0, b"recurse", b"onOk", b"onErr", limit, 1_000)?;
        Ok(())
    }

    let world = MockWorld::new()
        .function(A, "main", recurse)
        .function(A, "recurse", recurse)
        .noop(A, "onOk")
        .noop(A, "onErr");
    let mut engine = engine(world);
    let config = Config {
        max_call_depth: 3,
        ..Config::test()
    };
    let (mut host, _) = test_host(config, 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 1_000_000))?;
    assert!(output.return_code.is_ok());

    let world = engine.executor();
    assert_eq!(world.calls_to("recurse").len(), 2);
    assert_eq!(world.calls_to("onOk").len(), 2);
    // The innermost call and its callback were refused at the depth limit
    assert!(world.calls_to("onErr").is_empty());
    Ok(())
}

#[test]
fn test_cross_shard_round_trip() -> anyhow::Result<()> {
    init_logging();
    let world = MockWorld::new()
        .function(A, "main", |host, _| {
            tos_create_async_call(host, b"g", &C, 0, b"ping@01", b"onOk", b"onErr", 5_000, 2_000)?;
            Ok(())
        })
        .function(C, "ping", |host, _| {
            tos_finish(host, b"pong")?;
            Ok(())
        })
        .noop(A, "onOk");
    let mut engine = engine(world);
    let (mut host_a, _) = test_host(Config::test(), 2);
    let (mut host_c, _) = test_host(Config::test(), 2);

    // Origin partition: the call leaves as an outbound transfer
    let output = engine.execute_transaction(&mut host_a, ContractCallInput::direct(USER, A, "main", 100_000))?;
    assert!(output.return_code.is_ok());
    assert!(engine.executor().calls_to("ping").is_empty());
    assert_eq!(AsyncContext::load(&host_a, &A, &[0u8; 32])?.pending_calls(), 1);

    let transfer = output.output_accounts[&C].transfers[0].clone();
    assert_eq!(transfer.sender, A);
    assert_eq!(transfer.gas_limit, 5_000);
    assert_eq!(transfer.gas_locked, 2_000);
    assert_eq!(transfer.call_type, Some(CallType::AsynchronousCall));

    // Destination partition
    let (function, arguments) = CallArgsParser::new().parse_data(&transfer.data)?;
    let correlation_id = CorrelationId::try_from(arguments[0].as_slice())?;
    let input = ContractCallInput {
        arguments,
        call_value: transfer.value,
        gas_locked: transfer.gas_locked,
        call_type: CallType::AsynchronousCall,
        ..ContractCallInput::direct(A, C, &function, transfer.gas_limit)
    };
    let destination_output = engine.execute_transaction(&mut host_c, input)?;
    assert_eq!(destination_output.return_data, vec![b"pong".to_vec()]);
    assert_eq!(destination_output.gas_remaining, 5_000 - 10 - 5);

    // Back on the origin partition, funded by the returned gas
    let returned_gas = destination_output.gas_remaining + transfer.gas_locked;
    host_a.push_frame(ContractCallInput::direct(C, A, "", returned_gas));
    let context = AsyncContext::resume_persisted(&mut host_a, &mut engine, &[0u8; 32], &correlation_id, destination_output)?;
    host_a.pop_frame()?;
    assert!(context.is_finalized());

    let on_ok = engine.executor().calls_to("onOk")[0];
    assert_eq!(on_ok.caller, C);
    assert_eq!(on_ok.arguments, vec![Vec::new(), b"pong".to_vec()]);
    assert_eq!(on_ok.gas_provided, returned_gas - 10 - 14);
    assert_eq!(
        AsyncContext::load(&host_a, &A, &[0u8; 32]),
        Err(TosVmError::AsyncContextNotFound)
    );
    Ok(())
}

#[test]
fn test_finished_group_gas_stays_with_persisting_frame() -> anyhow::Result<()> {
    let world = MockWorld::new()
        .function(A, "main", |host, _| {
            call_b(host, b"ping", 1_000, 500)?;
            tos_create_async_call(host, b"remote", &C, 0, b"ping", b"onOk", b"onErr", 2_000, 0)?;
            Ok(())
        })
        .noop(B, "ping")
        .noop(A, "onOk");
    let mut engine = engine(world);
    let (mut host, _) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 100_000))?;
    assert_eq!(engine.executor().calls_to("onOk")[0].gas_provided, 1_465);

    let context = AsyncContext::load(&host, &A, &[0u8; 32])?;
    assert!(context.group("g").is_some_and(|group| group.is_complete()));
    assert_eq!(context.gas_accumulated(), 0);
    assert_eq!(context.pending_calls(), 1);

    let persisted = host
        .storage()
        .get(&A, &AsyncContext::storage_key(&[0u8; 32]))?
        .unwrap_or_default();
    // 8 bytes of call data, the async step burned by ping, the remote
    // limit and the persisted record
    assert_eq!(
        output.gas_remaining,
        100_000 - 8 - 10 - 2_000 - persisted.len() as u64
    );
    Ok(())
}

#[test]
fn test_returned_relay_runs_on_the_sender() -> anyhow::Result<()> {
    let relay = format!("NftTransfer@4e4654@01@01@{}", "01".repeat(32));
    let world = MockWorld::new()
        .function(A, "main", |host, _| call_b(host, b"withdraw", 1_000, 500))
        .function(B, "withdraw", move |host, _| {
            tos_finish(host, relay.as_bytes())?;
            Ok(())
        })
        .noop(B, "NftTransfer");
    let mut engine = engine(world);
    let (mut host, _) = test_host(Config::test(), 2);

    let output = engine.execute_transaction(&mut host, ContractCallInput::direct(USER, A, "main", 10_000))?;
    assert!(output.return_data.is_empty());

    let world = engine.executor();
    assert!(world.calls_to("onOk").is_empty());
    let relay = world.calls_to("NftTransfer")[0];
    // B and A share a partition, so the relay runs on B's own account
    assert_eq!(relay.caller, B);
    assert_eq!(relay.recipient, B);
    assert_eq!(
        relay.arguments,
        vec![b"NFT".to_vec(), vec![1], vec![1], A.to_vec(), b"onOk".to_vec(), Vec::new()]
    );
    Ok(())
}
