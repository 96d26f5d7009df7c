mod sensor_data;
