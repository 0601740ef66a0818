//! Configuration validation utilities.

use brook_core::Subscription;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BrookConfig, ClientConfig, ConsumerConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BrookConfig) -> ConfigResult<()> {
    validate_client(&config.client)?;
    validate_consumer(&config.consumer)?;
    validate_logging(&config.logging)?;
    Ok(())
}

/// Checks everything `listen` needs before it touches the broker.
pub fn validate_listen(
    client: &ClientConfig,
    consumer: &ConsumerConfig,
    subscriptions: &[Subscription],
) -> ConfigResult<()> {
    validate_client(client)?;
    validate_consumer(consumer)?;
    if subscriptions.is_empty() {
        return Err(ConfigError::NoTopics);
    }
    Ok(())
}

/// Validates broker client settings.
pub fn validate_client(client: &ClientConfig) -> ConfigResult<()> {
    if client.client_id.trim().is_empty() {
        return Err(ConfigError::missing_field("client.client_id"));
    }

    if client.brokers.is_empty() {
        return Err(ConfigError::missing_field("client.brokers"));
    }

    for broker in &client.brokers {
        validate_broker_address(broker)?;
    }

    if client.connection_timeout_ms == 0 || client.request_timeout_ms == 0 {
        return Err(ConfigError::validation("Timeouts must be greater than 0"));
    }

    Ok(())
}

/// Validates consumer group settings.
pub fn validate_consumer(consumer: &ConsumerConfig) -> ConfigResult<()> {
    if consumer.group_id.trim().is_empty() {
        return Err(ConfigError::missing_field("consumer.group_id"));
    }

    if consumer.session_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Session timeout must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

/// Validates a `host:port` broker address.
fn validate_broker_address(address: &str) -> ConfigResult<()> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(ConfigError::validation(format!(
            "Broker address '{address}' must be host:port"
        )));
    };

    if host.is_empty() {
        return Err(ConfigError::validation(format!(
            "Broker address '{address}' has an empty host"
        )));
    }

    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(ConfigError::validation(format!(
            "Broker address '{address}' has an invalid port"
        ))),
        Ok(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs() -> Vec<Subscription> {
        vec![Subscription::Exact("orders".into())]
    }

    #[test]
    fn test_valid_listen_config() {
        let client = ClientConfig::new("app", ["localhost:9092"]);
        let consumer = ConsumerConfig::new("group");
        assert!(validate_listen(&client, &consumer, &subs()).is_ok());
    }

    #[test]
    fn test_missing_fields() {
        let consumer = ConsumerConfig::new("group");

        let client = ClientConfig::new("", ["localhost:9092"]);
        assert_eq!(
            validate_listen(&client, &consumer, &subs()),
            Err(ConfigError::missing_field("client.client_id"))
        );

        let client = ClientConfig::new("app", Vec::<String>::new());
        assert_eq!(
            validate_listen(&client, &consumer, &subs()),
            Err(ConfigError::missing_field("client.brokers"))
        );

        let client = ClientConfig::new("app", ["localhost:9092"]);
        assert_eq!(
            validate_listen(&client, &ConsumerConfig::default(), &subs()),
            Err(ConfigError::missing_field("consumer.group_id"))
        );
    }

    #[test]
    fn test_no_topics() {
        let client = ClientConfig::new("app", ["localhost:9092"]);
        let consumer = ConsumerConfig::new("group");
        assert_eq!(
            validate_listen(&client, &consumer, &[]),
            Err(ConfigError::NoTopics)
        );
    }

    #[test]
    fn test_broker_address() {
        assert!(validate_broker_address("kafka-1:9092").is_ok());
        assert!(validate_broker_address("kafka-1").is_err());
        assert!(validate_broker_address(":9092").is_err());
        assert!(validate_broker_address("kafka-1:0").is_err());
        assert!(validate_broker_address("kafka-1:http").is_err());
    }

    #[test]
    fn test_file_logging_needs_path() {
        let mut config = BrookConfig {
            client: ClientConfig::new("app", ["localhost:9092"]),
            consumer: ConsumerConfig::new("group"),
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());

        config.logging.output = LogOutput::File;
        assert_eq!(
            validate_config(&config),
            Err(ConfigError::missing_field("logging.file_path"))
        );
    }
}
