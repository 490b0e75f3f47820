//! # Message Queue Endpoint Executable
//!
//! This executable exposes the robot to remote control over a message queue.
//! Requests arrive as JSON bodies of the form `{"operation", "parameter"}`
//! on a subscribed topic; the reply is published to the request's response
//! topic carrying the request's correlation data, so multiple operators can
//! share the queue without crossing answers.
//!
//! Requests are handled serially on the connection loop: a drive command
//! finishes (and the robot settles) before the next request is taken.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Request dispatch onto the control core.
mod dispatch;

/// Parameters for the message queue executable.
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use clap::Parser;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{info, warn};
use rumqttc::v5::{
    mqttbytes::v5::{Packet, Publish, PublishProperties},
    mqttbytes::QoS,
    Client, Event, MqttOptions,
};
use std::sync::Arc;
use std::time::Duration;

// Internal
use params::MqExecParams;
use robot_ctrl::board::SimBoard;
use robot_ctrl::motion_exec::MotionExecutor;
use robot_ctrl::motion_guard::MotionGuard;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Expose the robot to remote control over a message queue
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Broker address as host:port.
    #[arg(short, long, env = "MQ_URL", default_value = "localhost:1883")]
    url: String,

    /// Topic to receive requests on.
    #[arg(short, long, env = "MQ_ADDRESS", default_value = "robot/requests")]
    address: String,

    /// Minimum log level (info, debug or trace).
    #[arg(long, env = "MQ_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log everything, overriding --log-level.
    #[arg(long, env = "MQ_DEBUG")]
    debug: bool,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    let args = Args::parse();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mq_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    let min_level = if args.debug {
        LevelFilter::Trace
    } else {
        args.log_level
            .parse::<LevelFilter>()
            .map_err(|_| eyre!("Unrecognised log level {:?}", args.log_level))?
    };
    logger_init(min_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Message Queue Endpoint Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: MqExecParams =
        util::params::load("mq_exec.toml").wrap_err("Failed to load parameters")?;

    info!("Parameters loaded");

    // ---- INIT CONTROL CORE ----

    warn!("No hardware backend configured, using the simulated board");

    let exec = MotionExecutor::new(
        SimBoard::new(),
        Arc::new(MotionGuard::new()),
        params.motion_exec,
    );

    // ---- CONNECT TO THE BROKER ----

    let (host, port) = parse_broker_addr(&args.url)?;

    let mut options = MqttOptions::new("mq_exec", host, port);
    // Requests are handled inline on the connection loop, so a long drive
    // delays the next ping by its full duration. The keep-alive must
    // comfortably exceed the longest motion or the broker drops us mid-drive.
    options.set_keep_alive(Duration::from_secs(60));

    let (client, mut connection) = Client::new(options, 10);

    info!("Listening for requests on {:?} at {}", args.address, args.url);

    // ---- MAIN LOOP ----

    // The subscription is (re)made on every ConnAck: the client does not
    // replay subscriptions across a reconnect, so subscribing once up front
    // would leave the endpoint deaf after the first connection drop.
    for event in connection.iter() {
        match event {
            Ok(ref e) if needs_subscribe(e) => {
                info!("Connected to the broker, subscribing to {:?}", args.address);
                if let Err(e) = client.subscribe(&args.address, QoS::AtLeastOnce) {
                    warn!("Could not subscribe to the request topic: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                handle_request(&client, &exec, publish)
            }
            Ok(_) => (),
            Err(e) => {
                warn!("Connection error, retrying: {}", e);
                std::thread::sleep(Duration::from_secs(1));
            }
        }
    }

    // ---- SHUTDOWN ----

    if params.reset_on_exit {
        info!("Resetting the board before exit");

        if let Err(e) = exec.reset() {
            warn!("Board reset on exit failed: {}", e);
        }
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// True for events which require the request subscription to be (re)made.
fn needs_subscribe(event: &Event) -> bool {
    matches!(event, Event::Incoming(Packet::ConnAck(_)))
}

/// Execute one inbound request and publish the reply.
fn handle_request(client: &Client, exec: &MotionExecutor, publish: Publish) {
    let body = String::from_utf8_lossy(&publish.payload).into_owned();
    info!("Received message: {}", body);

    let reply = dispatch::dispatch(exec, &body);

    // Without a response topic there is nowhere to answer to
    let properties = match publish.properties {
        Some(p) => p,
        None => {
            warn!("Request carried no properties, dropping reply: {}", reply);
            return;
        }
    };
    let response_topic = match properties.response_topic {
        Some(t) => t,
        None => {
            warn!("Request carried no response topic, dropping reply: {}", reply);
            return;
        }
    };

    let reply_properties = PublishProperties {
        correlation_data: properties.correlation_data,
        ..Default::default()
    };

    match client.publish_with_properties(
        &response_topic,
        QoS::AtLeastOnce,
        false,
        reply.into_bytes(),
        reply_properties,
    ) {
        Ok(_) => info!("Answer sent to {:?}", response_topic),
        Err(e) => warn!("Could not send the answer to {:?}: {}", response_topic, e),
    }
}

/// Split a host:port broker address, defaulting the port to 1883.
fn parse_broker_addr(url: &str) -> Result<(String, u16)> {
    match url.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| eyre!("Invalid broker port in {:?}", url))?;
            Ok((host.into(), port))
        }
        None => Ok((url.into(), 1883)),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode, PingResp};

    #[test]
    fn test_subscribe_on_each_connack() {
        let connack = ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        };
        assert!(needs_subscribe(&Event::Incoming(Packet::ConnAck(connack))));
        assert!(!needs_subscribe(&Event::Incoming(Packet::PingResp(
            PingResp
        ))));
    }

    #[test]
    fn test_parse_broker_addr() {
        assert_eq!(
            parse_broker_addr("localhost:1883").unwrap(),
            ("localhost".into(), 1883)
        );
        assert_eq!(
            parse_broker_addr("broker.local").unwrap(),
            ("broker.local".into(), 1883)
        );
        assert!(parse_broker_addr("broker.local:notaport").is_err());
    }
}
