//! Static metadata about Redis commands, used for `:help` and autocompletion.

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
pub enum Group {
    Strings,
    Lists,
    Hashes,
    Sets,
    #[strum(serialize = "Sorted Sets")]
    SortedSets,
    Keys,
    Server,
    #[strum(serialize = "Pub/Sub")]
    PubSub,
    Transactions,
    Connection,
    Streams,
}

/// Worst-case time complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Complexity {
    #[strum(serialize = "O(1)")]
    Constant,
    #[strum(serialize = "O(log N)")]
    Logarithmic,
    #[strum(serialize = "O(N)")]
    Linear,
    #[strum(serialize = "O(M+N)")]
    LinearMN,
    #[strum(serialize = "O(N^2)")]
    Quadratic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    /// Upper-case name. Container commands include the subcommand, e.g. `CONFIG GET`.
    pub name: &'static str,
    pub syntax: &'static str,
    pub summary: &'static str,
    pub group: Group,
    pub complexity: Complexity,
    /// First server version that shipped the command.
    pub since: &'static str,
}

const fn entry(
    name: &'static str,
    syntax: &'static str,
    summary: &'static str,
    group: Group,
    complexity: Complexity,
    since: &'static str,
) -> CommandInfo {
    CommandInfo {
        name,
        syntax,
        summary,
        group,
        complexity,
        since,
    }
}

pub fn all() -> &'static [CommandInfo] {
    COMMANDS
}

/// Finds a command by name, ignoring case and extra whitespace between words.
pub fn lookup(name: &str) -> Option<&'static CommandInfo> {
    let name = name.split_whitespace().join(" ");
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(&name))
}

/// Commands whose name starts with `prefix`, sorted by name.
pub fn complete(prefix: &str) -> Vec<&'static CommandInfo> {
    let prefix = prefix.trim_start().to_ascii_uppercase();
    COMMANDS
        .iter()
        .filter(|c| c.name.starts_with(&prefix))
        .sorted_by_key(|c| c.name)
        .collect()
}

pub fn by_group(group: Group) -> impl Iterator<Item = &'static CommandInfo> {
    COMMANDS.iter().filter(move |c| c.group == group)
}

static COMMANDS: &[CommandInfo] = &[
    entry(
        "GET",
        "GET key",
        "Returns the value of a key",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SET",
        "SET key value [EX seconds | PX milliseconds | EXAT timestamp | PXAT milliseconds-timestamp | KEEPTTL] [NX | XX] [GET]",
        "Sets the value of a key",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "APPEND",
        "APPEND key value",
        "Append a value to a key",
        Group::Strings,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "INCR",
        "INCR key",
        "Increments the integer value of a key by one",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "DECR",
        "DECR key",
        "Decrements the integer value of a key by one",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "GETSET",
        "GETSET key value",
        "Sets the string value of a key and returns its old value",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "MGET",
        "MGET key [key ...]",
        "Gets the values of all the given keys",
        Group::Strings,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "MSET",
        "MSET key value [key value ...]",
        "Sets multiple keys to multiple values",
        Group::Strings,
        Complexity::Linear,
        "1.0.1",
    ),
    entry(
        "LPUSH",
        "LPUSH key element [element ...]",
        "Prepends one or multiple elements to a list",
        Group::Lists,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "RPUSH",
        "RPUSH key element [element ...]",
        "Appends one or multiple elements to a list",
        Group::Lists,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "LPOP",
        "LPOP key [count]",
        "Removes and returns the first element of a list",
        Group::Lists,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "RPOP",
        "RPOP key [count]",
        "Removes and returns the last element of a list",
        Group::Lists,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "LLEN",
        "LLEN key",
        "Returns the length of a list",
        Group::Lists,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "LRANGE",
        "LRANGE key start stop",
        "Returns a range of elements from a list",
        Group::Lists,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "LINDEX",
        "LINDEX key index",
        "Returns an element from a list by its index",
        Group::Lists,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "LSET",
        "LSET key index element",
        "Sets the value of an element in a list by its index",
        Group::Lists,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "HSET",
        "HSET key field value [field value ...]",
        "Sets the value of one or more fields in a hash",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "HSETNX",
        "HSETNX key field value",
        "Sets the value of a field in a hash only if the field does not exist",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "HGET",
        "HGET key field",
        "Returns the value of a field in a hash",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "HMGET",
        "HMGET key field [field ...]",
        "Returns the values of multiple fields in a hash",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "HDEL",
        "HDEL key field [field ...]",
        "Deletes one or more fields from a hash",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "HGETALL",
        "HGETALL key",
        "Returns all fields and values in a hash",
        Group::Hashes,
        Complexity::Linear,
        "2.0.0",
    ),
    entry(
        "HKEYS",
        "HKEYS key",
        "Returns all fields in a hash",
        Group::Hashes,
        Complexity::Linear,
        "2.0.0",
    ),
    entry(
        "HVALS",
        "HVALS key",
        "Returns all values in a hash",
        Group::Hashes,
        Complexity::Linear,
        "2.0.0",
    ),
    entry(
        "HINCRBY",
        "HINCRBY key field increment",
        "Increments the integer value of a field in a hash by the given number",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "HEXISTS",
        "HEXISTS key field",
        "Checks if a field exists in a hash",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "HLEN",
        "HLEN key",
        "Returns the number of fields in a hash",
        Group::Hashes,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "SADD",
        "SADD key member [member ...]",
        "Adds one or more members to a set",
        Group::Sets,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SREM",
        "SREM key member [member ...]",
        "Removes one or more members from a set",
        Group::Sets,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SMEMBERS",
        "SMEMBERS key",
        "Returns all members of a set",
        Group::Sets,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "SISMEMBER",
        "SISMEMBER key member",
        "Checks if a member exists in a set",
        Group::Sets,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SCARD",
        "SCARD key",
        "Returns the number of members in a set (cardinality)",
        Group::Sets,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SINTER",
        "SINTER key [key ...]",
        "Returns the intersection of multiple sets",
        Group::Sets,
        Complexity::Quadratic,
        "1.0.0",
    ),
    entry(
        "SUNION",
        "SUNION key [key ...]",
        "Returns the union of multiple sets",
        Group::Sets,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "SDIFF",
        "SDIFF key [key ...]",
        "Returns the difference between multiple sets",
        Group::Sets,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "SPOP",
        "SPOP key [count]",
        "Removes and returns one or more random members from a set",
        Group::Sets,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SRANDMEMBER",
        "SRANDMEMBER key [count]",
        "Returns one or multiple random members from a set",
        Group::Sets,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SMOVE",
        "SMOVE source destination member",
        "Moves a member from one set to another",
        Group::Sets,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SINTERSTORE",
        "SINTERSTORE destination key [key ...]",
        "Stores the intersection of multiple sets in a key",
        Group::Sets,
        Complexity::Quadratic,
        "1.0.0",
    ),
    entry(
        "SUNIONSTORE",
        "SUNIONSTORE destination key [key ...]",
        "Stores the union of multiple sets in a key",
        Group::Sets,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "SDIFFSTORE",
        "SDIFFSTORE destination key [key ...]",
        "Stores the difference between multiple sets in a key",
        Group::Sets,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "ZADD",
        "ZADD key [NX|XX] [CH] [INCR] score member [score member ...]",
        "Adds one or more members to a sorted set, or updates their score if they already exist",
        Group::SortedSets,
        Complexity::Logarithmic,
        "1.2.0",
    ),
    entry(
        "ZREM",
        "ZREM key member [member ...]",
        "Removes one or more members from a sorted set",
        Group::SortedSets,
        Complexity::Logarithmic,
        "1.2.0",
    ),
    entry(
        "ZRANGE",
        "ZRANGE key start stop [WITHSCORES]",
        "Returns a range of members in a sorted set, by index",
        Group::SortedSets,
        Complexity::Logarithmic,
        "1.2.0",
    ),
    entry(
        "ZREVRANGE",
        "ZREVRANGE key start stop [WITHSCORES]",
        "Returns a range of members in a sorted set, by index, with scores ordered from high to low",
        Group::SortedSets,
        Complexity::Logarithmic,
        "1.2.0",
    ),
    entry(
        "ZRANK",
        "ZRANK key member",
        "Returns the rank of a member in a sorted set, from low to high",
        Group::SortedSets,
        Complexity::Logarithmic,
        "2.0.0",
    ),
    entry(
        "ZREVRANK",
        "ZREVRANK key member",
        "Returns the rank of a member in a sorted set, from high to low",
        Group::SortedSets,
        Complexity::Logarithmic,
        "2.0.0",
    ),
    entry(
        "ZSCORE",
        "ZSCORE key member",
        "Returns the score of a member in a sorted set",
        Group::SortedSets,
        Complexity::Constant,
        "1.2.0",
    ),
    entry(
        "ZCARD",
        "ZCARD key",
        "Returns the cardinality (number of elements) of a sorted set",
        Group::SortedSets,
        Complexity::Constant,
        "1.2.0",
    ),
    entry(
        "ZCOUNT",
        "ZCOUNT key min max",
        "Returns the number of members in a sorted set with scores within the given range",
        Group::SortedSets,
        Complexity::Logarithmic,
        "2.0.0",
    ),
    entry(
        "ZINCRBY",
        "ZINCRBY key increment member",
        "Increments the score of a member in a sorted set",
        Group::SortedSets,
        Complexity::Logarithmic,
        "1.2.0",
    ),
    entry(
        "ZRANGEBYSCORE",
        "ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]",
        "Returns members in a sorted set with scores within the given range",
        Group::SortedSets,
        Complexity::Logarithmic,
        "1.0.5",
    ),
    entry(
        "ZREVRANGEBYSCORE",
        "ZREVRANGEBYSCORE key max min [WITHSCORES] [LIMIT offset count]",
        "Returns members in a sorted set with scores within the given range, ordered from high to low",
        Group::SortedSets,
        Complexity::Logarithmic,
        "2.2.0",
    ),
    entry(
        "ZREMRANGEBYRANK",
        "ZREMRANGEBYRANK key start stop",
        "Removes members in a sorted set within the given indexes",
        Group::SortedSets,
        Complexity::Logarithmic,
        "2.0.0",
    ),
    entry(
        "ZREMRANGEBYSCORE",
        "ZREMRANGEBYSCORE key min max",
        "Removes members in a sorted set within the given scores",
        Group::SortedSets,
        Complexity::Logarithmic,
        "1.2.0",
    ),
    entry(
        "DEL",
        "DEL key [key ...]",
        "Deletes one or more keys",
        Group::Keys,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "UNLINK",
        "UNLINK key [key ...]",
        "Asynchronously deletes one or more keys",
        Group::Keys,
        Complexity::Constant,
        "4.0.0",
    ),
    entry(
        "EXISTS",
        "EXISTS key [key ...]",
        "Checks if one or more keys exist",
        Group::Keys,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "EXPIRE",
        "EXPIRE key seconds [NX|XX|GT|LT]",
        "Sets a timeout on a key, after which it will be automatically deleted",
        Group::Keys,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "EXPIREAT",
        "EXPIREAT key timestamp [NX|XX|GT|LT]",
        "Sets the expiry for a key as a UNIX timestamp",
        Group::Keys,
        Complexity::Constant,
        "1.2.0",
    ),
    entry(
        "TTL",
        "TTL key",
        "Returns the remaining time to live of a key",
        Group::Keys,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "TYPE",
        "TYPE key",
        "Returns the data type of the value stored at a key",
        Group::Keys,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "RENAME",
        "RENAME key newkey",
        "Renames a key",
        Group::Keys,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "RENAMENX",
        "RENAMENX key newkey",
        "Renames a key, only if the new key does not exist",
        Group::Keys,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "KEYS",
        "KEYS pattern",
        "Finds all keys matching the specified pattern",
        Group::Keys,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "SCAN",
        "SCAN cursor [MATCH pattern] [COUNT count] [TYPE type]",
        "Incrementally iterates the keys in a database",
        Group::Keys,
        Complexity::Constant,
        "2.8.0",
    ),
    entry(
        "RANDOMKEY",
        "RANDOMKEY",
        "Returns a random key from the keyspace",
        Group::Keys,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "INFO",
        "INFO [section]",
        "Returns information and statistics about the server",
        Group::Server,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "PING",
        "PING [message]",
        "Tests connection, returns PONG or the provided message",
        Group::Server,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "TIME",
        "TIME",
        "Returns the server time",
        Group::Server,
        Complexity::Constant,
        "2.6.0",
    ),
    entry(
        "CONFIG GET",
        "CONFIG GET parameter [parameter ...]",
        "Gets configuration parameters",
        Group::Server,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "CONFIG SET",
        "CONFIG SET parameter value [parameter value ...]",
        "Sets configuration parameters",
        Group::Server,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "DBSIZE",
        "DBSIZE",
        "Returns the number of keys in the current database",
        Group::Server,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "FLUSHDB",
        "FLUSHDB [ASYNC]",
        "Removes all keys from the current database",
        Group::Server,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "FLUSHALL",
        "FLUSHALL [ASYNC]",
        "Removes all keys from all databases",
        Group::Server,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "CLIENT LIST",
        "CLIENT LIST [TYPE normal|master|replica|pubsub]",
        "Returns information and statistics about client connections",
        Group::Server,
        Complexity::Linear,
        "2.4.0",
    ),
    entry(
        "CLIENT KILL",
        "CLIENT KILL [ip:port] [ID client-id] [TYPE normal|master|replica|pubsub] [ADDR ip:port] [SKIPME yes/no]",
        "Kills a client connection",
        Group::Server,
        Complexity::Linear,
        "2.4.0",
    ),
    entry(
        "PUBLISH",
        "PUBLISH channel message",
        "Posts a message to a channel",
        Group::PubSub,
        Complexity::Linear,
        "2.0.0",
    ),
    entry(
        "SUBSCRIBE",
        "SUBSCRIBE channel [channel ...]",
        "Subscribes to channels",
        Group::PubSub,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "UNSUBSCRIBE",
        "UNSUBSCRIBE [channel [channel ...]]",
        "Unsubscribes from channels",
        Group::PubSub,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "PSUBSCRIBE",
        "PSUBSCRIBE pattern [pattern ...]",
        "Subscribes to channels matching patterns",
        Group::PubSub,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "PUNSUBSCRIBE",
        "PUNSUBSCRIBE [pattern [pattern ...]]",
        "Unsubscribes from channels matching patterns",
        Group::PubSub,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "PUBSUB",
        "PUBSUB subcommand [argument [argument ...]]",
        "Introspection command for the Pub/Sub system",
        Group::PubSub,
        Complexity::Constant,
        "2.8.0",
    ),
    entry(
        "MULTI",
        "MULTI",
        "Marks the start of a transaction block",
        Group::Transactions,
        Complexity::Constant,
        "1.2.0",
    ),
    entry(
        "EXEC",
        "EXEC",
        "Executes all commands issued after MULTI",
        Group::Transactions,
        Complexity::Constant,
        "1.2.0",
    ),
    entry(
        "DISCARD",
        "DISCARD",
        "Discards all commands issued after MULTI",
        Group::Transactions,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "WATCH",
        "WATCH key [key ...]",
        "Watches keys for modifications in a transaction",
        Group::Transactions,
        Complexity::Constant,
        "2.2.0",
    ),
    entry(
        "UNWATCH",
        "UNWATCH",
        "Removes all watched keys",
        Group::Transactions,
        Complexity::Constant,
        "2.2.0",
    ),
    entry(
        "STRLEN",
        "STRLEN key",
        "Returns the length of the string value stored at a key",
        Group::Strings,
        Complexity::Constant,
        "2.2.0",
    ),
    entry(
        "GETDEL",
        "GETDEL key",
        "Returns the value of a key and deletes the key",
        Group::Strings,
        Complexity::Constant,
        "6.2.0",
    ),
    entry(
        "INCRBY",
        "INCRBY key increment",
        "Increments the integer value of a key by the given amount",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "DECRBY",
        "DECRBY key decrement",
        "Decrements the integer value of a key by the given amount",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SETNX",
        "SETNX key value",
        "Sets the value of a key only if the key does not exist",
        Group::Strings,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "SETEX",
        "SETEX key seconds value",
        "Sets the value and expiration of a key",
        Group::Strings,
        Complexity::Constant,
        "2.0.0",
    ),
    entry(
        "LREM",
        "LREM key count element",
        "Removes elements from a list",
        Group::Lists,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "LTRIM",
        "LTRIM key start stop",
        "Trims a list to the specified range",
        Group::Lists,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "HSCAN",
        "HSCAN key cursor [MATCH pattern] [COUNT count]",
        "Incrementally iterates the fields and values of a hash",
        Group::Hashes,
        Complexity::Constant,
        "2.8.0",
    ),
    entry(
        "SSCAN",
        "SSCAN key cursor [MATCH pattern] [COUNT count]",
        "Incrementally iterates the members of a set",
        Group::Sets,
        Complexity::Constant,
        "2.8.0",
    ),
    entry(
        "ZSCAN",
        "ZSCAN key cursor [MATCH pattern] [COUNT count]",
        "Incrementally iterates the members and scores of a sorted set",
        Group::SortedSets,
        Complexity::Constant,
        "2.8.0",
    ),
    entry(
        "PERSIST",
        "PERSIST key",
        "Removes the expiration from a key",
        Group::Keys,
        Complexity::Constant,
        "2.2.0",
    ),
    entry(
        "PEXPIRE",
        "PEXPIRE key milliseconds [NX|XX|GT|LT]",
        "Sets the expiration of a key in milliseconds",
        Group::Keys,
        Complexity::Constant,
        "2.6.0",
    ),
    entry(
        "PTTL",
        "PTTL key",
        "Returns the remaining time to live of a key in milliseconds",
        Group::Keys,
        Complexity::Constant,
        "2.6.0",
    ),
    entry(
        "OBJECT ENCODING",
        "OBJECT ENCODING key",
        "Returns the internal encoding of a value",
        Group::Keys,
        Complexity::Constant,
        "2.2.3",
    ),
    entry(
        "MEMORY USAGE",
        "MEMORY USAGE key [SAMPLES count]",
        "Estimates the memory usage of a key",
        Group::Keys,
        Complexity::Linear,
        "4.0.0",
    ),
    entry(
        "XADD",
        "XADD key [NOMKSTREAM] [MAXLEN|MINID [=|~] threshold] *|id field value [field value ...]",
        "Appends a new entry to a stream",
        Group::Streams,
        Complexity::Constant,
        "5.0.0",
    ),
    entry(
        "XLEN",
        "XLEN key",
        "Returns the number of entries in a stream",
        Group::Streams,
        Complexity::Constant,
        "5.0.0",
    ),
    entry(
        "XRANGE",
        "XRANGE key start end [COUNT count]",
        "Returns the entries of a stream within a range of IDs",
        Group::Streams,
        Complexity::Linear,
        "5.0.0",
    ),
    entry(
        "XREVRANGE",
        "XREVRANGE key end start [COUNT count]",
        "Returns the entries of a stream within a range of IDs, in reverse order",
        Group::Streams,
        Complexity::Linear,
        "5.0.0",
    ),
    entry(
        "XREAD",
        "XREAD [COUNT count] [BLOCK milliseconds] STREAMS key [key ...] id [id ...]",
        "Reads entries from one or more streams",
        Group::Streams,
        Complexity::Linear,
        "5.0.0",
    ),
    entry(
        "XDEL",
        "XDEL key id [id ...]",
        "Removes entries from a stream",
        Group::Streams,
        Complexity::Constant,
        "5.0.0",
    ),
    entry(
        "SSUBSCRIBE",
        "SSUBSCRIBE shardchannel [shardchannel ...]",
        "Subscribes to shard channels",
        Group::PubSub,
        Complexity::Constant,
        "7.0.0",
    ),
    entry(
        "AUTH",
        "AUTH [username] password",
        "Authenticates the connection",
        Group::Connection,
        Complexity::Linear,
        "1.0.0",
    ),
    entry(
        "HELLO",
        "HELLO [protover [AUTH username password] [SETNAME clientname]]",
        "Handshakes with the server and switches the protocol version",
        Group::Connection,
        Complexity::Constant,
        "6.0.0",
    ),
    entry(
        "SELECT",
        "SELECT index",
        "Changes the selected database",
        Group::Connection,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "ECHO",
        "ECHO message",
        "Returns the given string",
        Group::Connection,
        Complexity::Constant,
        "1.0.0",
    ),
    entry(
        "CLIENT SETNAME",
        "CLIENT SETNAME connection-name",
        "Sets the connection name",
        Group::Connection,
        Complexity::Constant,
        "2.6.9",
    ),
    entry(
        "CLIENT ID",
        "CLIENT ID",
        "Returns the unique ID of the connection",
        Group::Connection,
        Complexity::Constant,
        "5.0.0",
    ),
    entry(
        "QUIT",
        "QUIT",
        "Closes the connection",
        Group::Connection,
        Complexity::Constant,
        "1.0.0",
    ),
];
