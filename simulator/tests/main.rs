use i2c_master::{
    BusConfig, ConfigError, ErrorKind, Fault, FaultKind, I2c, I2cMaster, NoAcknowledgeSource,
    Operation, Phase, PollBudget, Request, SlaveAddress,
};
use i2c_master::Error as _;
use simulator::peripheral::{Access, SimPeripheral};
use simulator::simulator;
use simulator::target::{BusEvent, SimTarget};

const A7: u8 = 0x76;
const ADDR: SlaveAddress = match SlaveAddress::new(A7) {
    Some(address) => address,
    None => panic!(),
};

fn bus(target: SimTarget) -> I2cMaster<SimPeripheral> {
    bus_with(SimPeripheral::new(target))
}

fn bus_with(peripheral: SimPeripheral) -> I2cMaster<SimPeripheral> {
    let _ = env_logger::try_init();
    simulator(peripheral, &BusConfig::default()).unwrap()
}

fn bmp280() -> SimTarget {
    SimTarget::new(A7).with_register(0xD0, 0x58)
}

#[test]
fn chip_id() {
    let mut c = bus(bmp280());

    let id = c.read_register::<1>(Request::new(ADDR, 0xD0)).unwrap();
    assert_eq!(id, [0x58]);

    let regs = c.registers();
    assert_eq!(
        regs.target().events(),
        [
            BusEvent::Start,
            BusEvent::Address { read: false },
            BusEvent::Written(0xD0),
            BusEvent::Start,
            BusEvent::Address { read: true },
            BusEvent::Read {
                byte: 0x58,
                acked: false
            },
            BusEvent::Stop,
        ]
    );

    let stored: Vec<u8> = regs
        .accesses()
        .iter()
        .filter_map(|access| match access {
            Access::WriteData(byte) => Some(*byte),
            _ => None,
        })
        .collect();
    assert_eq!(stored, [0xEC, 0xD0, 0xED]);
    assert!(regs.ack_enabled());
    assert!(regs.bus_idle());
}

#[test]
fn repeated_reads() {
    let mut c = bus(bmp280());

    for _ in 0..3 {
        let id = c.read_register::<1>(Request::new(ADDR, 0xD0)).unwrap();
        assert_eq!(id, [0x58]);
    }
    assert_eq!(c.registers().count(Access::Stop), 3);
}

#[test]
fn calibration_block() {
    let calibration: [u8; 24] = std::array::from_fn(|n| 0x80 + n as u8);
    let mut c = bus(bmp280().with_registers(0x88, &calibration));

    let data = c.read_register::<24>(Request::new(ADDR, 0x88)).unwrap();
    assert_eq!(data, calibration);
    assert_eq!(c.registers().target().bytes_served(), 24);
}

#[test]
fn two_byte_read() {
    let mut c = bus(bmp280().with_registers(0xF7, &[0x65, 0x43]));

    let mut buf = [0; 2];
    c.read_register_into(Request::new(ADDR, 0xF7), &mut buf)
        .unwrap();
    assert_eq!(buf, [0x65, 0x43]);
}

#[test]
fn register_write() {
    let mut c = bus(bmp280());

    c.write(A7, &[0xF4, 0x27]).unwrap();
    assert_eq!(c.registers().target().register(0xF4), 0x27);
    assert_eq!(
        c.registers().target().events(),
        [
            BusEvent::Start,
            BusEvent::Address { read: false },
            BusEvent::Written(0xF4),
            BusEvent::Written(0x27),
            BusEvent::Stop,
        ]
    );
}

#[test]
fn write_read_through_trait() {
    let mut c = bus(bmp280().with_registers(0xFA, &[1, 2, 3]));

    let mut buf = [0; 3];
    c.write_read(A7, &[0xFA], &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3]);
}

#[test]
fn long_transaction() {
    let mut c = bus(bmp280().with_registers(0x10, &[3, 4]));

    let mut a = [0];
    let mut b = [0];
    let mut operations = [
        Operation::Write(&[0x10]),
        Operation::Read(&mut a),
        Operation::Read(&mut b),
        Operation::Write(&[0x20]),
        Operation::Write(&[5, 6]),
    ];
    c.transaction(A7, &mut operations).unwrap();

    assert_eq!(a, [3]);
    assert_eq!(b, [4]);
    assert_eq!(c.registers().target().register(0x20), 5);
    assert_eq!(c.registers().target().register(0x21), 6);

    let starts = c
        .registers()
        .target()
        .events()
        .iter()
        .filter(|event| **event == BusEvent::Start)
        .count();
    assert_eq!(starts, 3);
}

#[test]
fn read_then_write() {
    let mut c = bus(bmp280());

    let mut id = [0];
    let mut operations = [Operation::Read(&mut id), Operation::Write(&[0xD0])];
    c.transaction(A7, &mut operations).unwrap();

    // The pointer starts at zero
    assert_eq!(id, [0]);
    assert_eq!(
        c.registers().target().events(),
        [
            BusEvent::Start,
            BusEvent::Address { read: true },
            BusEvent::Read {
                byte: 0,
                acked: false
            },
            BusEvent::Start,
            BusEvent::Address { read: false },
            BusEvent::Written(0xD0),
            BusEvent::Stop,
        ]
    );
}

#[test]
fn address_only_write() {
    let mut c = bus(bmp280());
    c.write(A7, &[]).unwrap();
    assert_eq!(
        c.registers().target().events(),
        [
            BusEvent::Start,
            BusEvent::Address { read: false },
            BusEvent::Stop,
        ]
    );

    let err = c.write(0x77, &[]).unwrap_err();
    assert_eq!(
        err.kind(),
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    );
}

#[test]
fn empty_transaction_touches_nothing() {
    let mut c = bus(bmp280());
    let before = c.registers().accesses().len();

    c.transaction(A7, &mut []).unwrap();
    c.read(A7, &mut []).unwrap();
    assert_eq!(c.registers().accesses().len(), before);
}

#[test]
fn budget_follows_bus_speed() {
    let c = bus(bmp280());
    assert_eq!(c.budget(), PollBudget::DEFAULT);

    let slow = BusConfig {
        scl_hz: 5_000,
        ..BusConfig::default()
    };
    let mut c = simulator(SimPeripheral::new(bmp280()), &slow).unwrap();
    assert_eq!(c.budget(), PollBudget::iterations(200_000));
    assert_eq!(c.registers().timing(), (16, 1600, 17));

    let id = c.read_register::<1>(Request::new(ADDR, 0xD0)).unwrap();
    assert_eq!(id, [0x58]);
}

#[test]
fn too_slow_bus_is_rejected() {
    let crawl = BusConfig {
        scl_hz: 1_000,
        ..BusConfig::default()
    };
    let err = simulator(SimPeripheral::new(bmp280()), &crawl).err();
    assert_eq!(err, Some(ConfigError::BusFrequency(1_000)));
}

#[test]
fn slow_peripheral() {
    let mut c = bus_with(SimPeripheral::new(bmp280()).with_latency(50));

    let id = c.read_register::<1>(Request::new(ADDR, 0xD0)).unwrap();
    assert_eq!(id, [0x58]);
}

#[test]
fn latency_beyond_budget() {
    let mut c = bus_with(SimPeripheral::new(bmp280()).with_latency(50))
        .with_budget(PollBudget::iterations(10));

    let err = c.read_register::<1>(Request::new(ADDR, 0xD0)).unwrap_err();
    assert_eq!(
        err,
        Fault {
            kind: FaultKind::StartTimeout,
            phase: Phase::Start
        }
    );
}

#[test]
fn invalid_address() {
    let mut c = bus(bmp280());
    let before = c.registers().accesses().len();

    let err = c.write(0xEC, &[0xD0]).unwrap_err();
    assert_eq!(err.kind, FaultKind::InvalidAddress);
    assert_eq!(err.kind(), ErrorKind::Other);
    assert_eq!(c.registers().accesses().len(), before);
}

#[test]
fn recovers_after_missing_device() {
    let target = SimTarget::new(0x77).with_register(0xD0, 0x58);
    assert_ne!(target.address(), A7);
    let mut c = bus(target);

    let err = c.read_register::<1>(Request::new(ADDR, 0xD0)).unwrap_err();
    assert_eq!(err.kind, FaultKind::AddressNackOrTimeout);
    assert_eq!(err.phase, Phase::AddressWriteSent);

    let secondary = SlaveAddress::new(0x77).unwrap();
    let id = c.read_register::<1>(Request::new(secondary, 0xD0)).unwrap();
    assert_eq!(id, [0x58]);
}
